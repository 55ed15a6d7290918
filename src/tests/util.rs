use crate::clcw::Clcw;
use crate::config::Config;
use crate::endpoint::{Ground, GroundHandler, Spacecraft, SpacecraftHandler};
use crate::space_packet::SpacePacketHeader;

/// Captures everything an endpoint hands to its handler.
#[derive(Default)]
pub struct Recording {
    pub packets: Vec<(u8, SpacePacketHeader, Vec<u8>)>,
    pub clcws: Vec<(u8, Clcw)>,
    /// Bytes queued for the "radio"
    pub out: Vec<u8>,
}

impl SpacecraftHandler for Recording {
    fn on_space_packet(&mut self, virtual_channel: u8, header: &SpacePacketHeader, payload: &[u8]) {
        self.packets
            .push((virtual_channel, *header, payload.to_vec()));
    }

    fn on_tm_bytes(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }
}

impl GroundHandler for Recording {
    fn on_space_packet(&mut self, virtual_channel: u8, header: &SpacePacketHeader, payload: &[u8]) {
        self.packets
            .push((virtual_channel, *header, payload.to_vec()));
    }

    fn on_clcw(&mut self, virtual_channel: u8, clcw: Clcw) {
        self.clcws.push((virtual_channel, clcw));
    }

    fn on_tc_bytes(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }
}

/// A ground station and a spacecraft wired back to back.
pub struct Pair {
    pub ground: Ground,
    pub space: Spacecraft,
    /// Events seen by the ground, including queued uplink bytes
    pub ground_events: Recording,
    /// Events seen by the spacecraft, including queued downlink bytes
    pub space_events: Recording,
    use_cltu: bool,
}

/// A configuration small enough that test vectors stay readable: 64-byte
/// frames, two telecommand channels, everything optional switched on.
pub fn config() -> Config {
    let mut config = Config::new(vec![0x1BB]);
    config.tc_frame_max_size = 64;
    config.tm_frame_size = 64;
    config.sp_max_data_size = 128;
    config.max_tc_channels = 2;
    config.use_cltu = true;
    config
}

impl Pair {
    pub fn new(config: Config) -> Self {
        let use_cltu = config.use_cltu;
        Self {
            ground: Ground::new(config.clone()).unwrap(),
            space: Spacecraft::new(config).unwrap(),
            ground_events: Recording::default(),
            space_events: Recording::default(),
            use_cltu,
        }
    }

    /// Moves queued uplink bytes into the spacecraft.
    pub fn drive_uplink(&mut self) {
        let bytes = std::mem::take(&mut self.ground_events.out);
        if self.use_cltu {
            self.space.process_cltu(&bytes, &mut self.space_events);
        } else {
            self.space.process_tc(&bytes, &mut self.space_events);
        }
    }

    /// Moves queued uplink bytes into the spacecraft in `chunk`-sized
    /// slices, exercising the incremental decoders.
    pub fn drive_uplink_chunked(&mut self, chunk: usize) {
        let bytes = std::mem::take(&mut self.ground_events.out);
        for piece in bytes.chunks(chunk.max(1)) {
            if self.use_cltu {
                self.space.process_cltu(piece, &mut self.space_events);
            } else {
                self.space.process_tc(piece, &mut self.space_events);
            }
        }
    }

    /// Drops queued uplink bytes on the floor, simulating a lost frame.
    pub fn lose_uplink(&mut self) {
        self.ground_events.out.clear();
    }

    /// Moves queued downlink bytes into the ground station.
    pub fn drive_downlink(&mut self) {
        let bytes = std::mem::take(&mut self.space_events.out);
        self.ground.process_tm(&bytes, &mut self.ground_events);
    }
}
