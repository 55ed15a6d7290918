//! The spacecraft side: telecommand reception behind the FARM, telemetry
//! emission with the CLCW report.

use tracing::{debug, trace};

use crate::clcw::Clcw;
use crate::cltu::{self, CltuSink};
use crate::config::{Config, ConfigError};
use crate::farm::{parse_control_command, Acceptance, ControlCommand, FarmState};
use crate::frame::tc::{TcDecoder, TcFrameHeader, TcFrameSink};
use crate::frame::tm::{self, TmFrameHeader};
use crate::frame::ASM;
use crate::space_packet::{self, PacketType, Parser, SequenceFlags, SpacePacketSink};
use crate::{saturating_inc, EncodeError};

use super::SpacecraftHandler;

#[derive(Default)]
struct UplinkCounters {
    scid_errors: u16,
    vc_errors: u16,
    retransmit_errors: u16,
    lockout_errors: u16,
}

/// The onboard coordinator.
///
/// Feed uplink bytes through [`process_cltu`](Spacecraft::process_cltu) or
/// [`process_tc`](Spacecraft::process_tc); accepted command packets and
/// outgoing telemetry reach the caller through its [`SpacecraftHandler`].
/// One instance owns all per-virtual-channel state of its link and shares
/// nothing.
pub struct Spacecraft {
    config: Config,
    cltu: Option<cltu::Decoder>,
    tc: TcDecoder,
    farm: Vec<FarmState>,
    parsers: Vec<Parser>,
    counters: UplinkCounters,
    /// Master channel frame count of the next TM frame
    mcfc: u8,
    /// Per-TM-channel frame counts
    vcfc: Vec<u8>,
    idle_sp_seq: u16,
    sp_buf: Vec<u8>,
    tm_buf: Vec<u8>,
}

impl Spacecraft {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let body = config.tm_body_size();
        Ok(Self {
            cltu: config.use_cltu.then(cltu::Decoder::new),
            tc: TcDecoder::new(
                config.tc_frame_max_size,
                config.tc_segment_header,
                config.use_fecf,
            ),
            farm: vec![FarmState::new(); config.max_tc_channels],
            parsers: (0..config.max_tc_channels)
                .map(|_| Parser::new(config.sp_max_data_size))
                .collect(),
            counters: UplinkCounters::default(),
            mcfc: 0,
            vcfc: vec![0; config.max_tm_channels],
            idle_sp_seq: 0,
            sp_buf: vec![0; body],
            tm_buf: vec![0; config.tm_frame_size],
            config,
        })
    }

    /// Feeds raw uplink bytes through the CLTU layer.
    ///
    /// No-op unless the configuration enables CLTU handling.
    pub fn process_cltu<H: SpacecraftHandler>(&mut self, bytes: &[u8], handler: &mut H) {
        let Some(decoder) = self.cltu.as_mut() else {
            debug!("CLTU bytes fed to a link configured without CLTU support");
            return;
        };
        let mut forward = CltuForward {
            tc: &mut self.tc,
            sink: FarmSink {
                config: &self.config,
                farm: &mut self.farm,
                parsers: &mut self.parsers,
                counters: &mut self.counters,
                handler,
            },
        };
        decoder.push(bytes, &mut forward);
    }

    /// Feeds a TC frame stream directly, bypassing the CLTU layer.
    pub fn process_tc<H: SpacecraftHandler>(&mut self, bytes: &[u8], handler: &mut H) {
        let mut sink = FarmSink {
            config: &self.config,
            farm: &mut self.farm,
            parsers: &mut self.parsers,
            counters: &mut self.counters,
            handler,
        };
        self.tc.push(bytes, &mut sink);
    }

    /// Synchronizes the TC frame decoder on a frame boundary, for callers
    /// whose framing layer lives outside this crate.
    pub fn set_sync(&mut self) {
        self.tc.set_sync();
    }

    /// Builds and emits one telemetry frame carrying `payload` as a space
    /// packet, padded with an idle packet and reporting the CLCW of
    /// `virtual_channel`.
    pub fn send_tm<H: SpacecraftHandler>(
        &mut self,
        virtual_channel: u8,
        apid: u16,
        sequence_count: u16,
        payload: &[u8],
        handler: &mut H,
    ) -> Result<(), EncodeError> {
        if usize::from(virtual_channel) >= self.config.max_tm_channels {
            return Err(EncodeError::InvalidChannel);
        }
        let body = self.config.tm_body_size();
        if space_packet::HEADER_SIZE + payload.len() > body {
            return Err(EncodeError::PayloadTooLarge);
        }
        let mut used = space_packet::encode(
            PacketType::Telemetry,
            SequenceFlags::Unsegmented,
            apid,
            sequence_count,
            None,
            payload,
            &mut self.sp_buf[..body],
        )?;
        // telemetry frames are fixed size; fill what remains with an idle
        // packet where one fits, frame fill otherwise
        if body - used > space_packet::HEADER_SIZE {
            let idle_seq = self.idle_sp_seq;
            self.idle_sp_seq = (self.idle_sp_seq + 1) & 0x3FFF;
            used += space_packet::encode_idle(idle_seq, body - used, &mut self.sp_buf[used..body])?;
        }

        let header = TmFrameHeader {
            spacecraft_id: self.config.scids[0],
            virtual_channel,
            master_frame_count: self.mcfc,
            virtual_frame_count: self.vcfc[usize::from(virtual_channel)],
            secondary_header: false,
            first_header_pointer: 0,
        };
        let ocf = self
            .config
            .use_ocf
            .then(|| self.clcw_for(virtual_channel).word());
        tm::encode(
            &header,
            &self.sp_buf[..used],
            ocf,
            self.config.tm_frame_size,
            self.config.use_fecf,
            &mut self.tm_buf,
        )?;
        self.mcfc = self.mcfc.wrapping_add(1);
        self.vcfc[usize::from(virtual_channel)] =
            self.vcfc[usize::from(virtual_channel)].wrapping_add(1);
        trace!(
            virtual_channel,
            mcfc = header.master_frame_count,
            "telemetry frame emitted"
        );
        handler.on_tm_bytes(&ASM);
        handler.on_tm_bytes(&self.tm_buf);
        Ok(())
    }

    /// Emits one idle telemetry frame on the configured idle channel.
    pub fn send_idle<H: SpacecraftHandler>(&mut self, handler: &mut H) -> Result<(), EncodeError> {
        let mut virtual_channel = self.config.idle_vc;
        if usize::from(virtual_channel) >= self.config.max_tm_channels {
            virtual_channel = 0;
        }
        let header = TmFrameHeader {
            spacecraft_id: self.config.scids[0],
            virtual_channel,
            master_frame_count: self.mcfc,
            virtual_frame_count: self.vcfc[usize::from(virtual_channel)],
            secondary_header: false,
            first_header_pointer: 0,
        };
        let ocf = self
            .config
            .use_ocf
            .then(|| self.clcw_for(virtual_channel).word());
        tm::encode_idle(
            &header,
            ocf,
            self.config.tm_frame_size,
            self.config.use_fecf,
            &mut self.tm_buf,
        )?;
        self.mcfc = self.mcfc.wrapping_add(1);
        self.vcfc[usize::from(virtual_channel)] =
            self.vcfc[usize::from(virtual_channel)].wrapping_add(1);
        handler.on_tm_bytes(&ASM);
        handler.on_tm_bytes(&self.tm_buf);
        Ok(())
    }

    /// The CLCW currently reported for a channel. Channels without FARM
    /// state report a fixed word flagging the uplink as unavailable.
    fn clcw_for(&self, virtual_channel: u8) -> Clcw {
        match self.farm.get(usize::from(virtual_channel)) {
            Some(state) => state.clcw(virtual_channel),
            None => Clcw {
                virtual_channel,
                no_rf_avail: true,
                no_bit_lock: true,
                ..Clcw::default()
            },
        }
    }

    /// FARM state of a telecommand channel.
    pub fn farm(&self, virtual_channel: u8) -> Option<&FarmState> {
        self.farm.get(usize::from(virtual_channel))
    }

    /// Replaces the accepted spacecraft ID list.
    pub fn set_scids(&mut self, scids: Vec<u16>) -> Result<(), ConfigError> {
        if scids.is_empty() {
            return Err(ConfigError::NoSpacecraftIds);
        }
        self.config.scids = scids;
        Ok(())
    }

    pub fn scid_error_count(&self) -> u16 {
        self.counters.scid_errors
    }

    pub fn vc_error_count(&self) -> u16 {
        self.counters.vc_errors
    }

    pub fn retransmit_error_count(&self) -> u16 {
        self.counters.retransmit_errors
    }

    pub fn lockout_error_count(&self) -> u16 {
        self.counters.lockout_errors
    }

    pub fn tc_sync_error_count(&self) -> u16 {
        self.tc.sync_error_count()
    }

    pub fn tc_checksum_error_count(&self) -> u16 {
        self.tc.checksum_error_count()
    }

    pub fn tc_overflow_error_count(&self) -> u16 {
        self.tc.overflow_error_count()
    }

    pub fn sp_sync_error_count(&self, virtual_channel: u8) -> Option<u16> {
        self.parsers
            .get(usize::from(virtual_channel))
            .map(Parser::sync_error_count)
    }

    pub fn sp_overflow_error_count(&self, virtual_channel: u8) -> Option<u16> {
        self.parsers
            .get(usize::from(virtual_channel))
            .map(Parser::overflow_error_count)
    }

    /// Clears every error counter of the uplink path.
    pub fn clear_error_counters(&mut self) {
        self.counters = UplinkCounters::default();
        self.tc.clear_error_counters();
        for parser in &mut self.parsers {
            parser.clear_error_counters();
        }
    }
}

struct CltuForward<'a, H> {
    tc: &'a mut TcDecoder,
    sink: FarmSink<'a, H>,
}

impl<H: SpacecraftHandler> CltuSink for CltuForward<'_, H> {
    fn on_start_of_transmission(&mut self) {
        // TC frames have no marker of their own; the CLTU start is it
        self.tc.set_sync();
    }

    fn on_cltu_block(&mut self, block: &[u8; cltu::BLOCK_SIZE]) {
        self.tc.push(block, &mut self.sink);
    }
}

struct FarmSink<'a, H> {
    config: &'a Config,
    farm: &'a mut [FarmState],
    parsers: &'a mut [Parser],
    counters: &'a mut UplinkCounters,
    handler: &'a mut H,
}

impl<H: SpacecraftHandler> TcFrameSink for FarmSink<'_, H> {
    fn on_tc_frame(&mut self, header: &TcFrameHeader, payload: &[u8]) {
        if !self.config.scids.contains(&header.spacecraft_id) {
            debug!(
                scid = header.spacecraft_id,
                "frame for a foreign spacecraft dropped"
            );
            saturating_inc(&mut self.counters.scid_errors);
            return;
        }
        let vc = usize::from(header.virtual_channel);
        if vc >= self.farm.len() {
            debug!(
                virtual_channel = header.virtual_channel,
                "frame on an unconfigured channel dropped"
            );
            saturating_inc(&mut self.counters.vc_errors);
            return;
        }

        if header.bypass {
            self.farm[vc].type_b_arrival();
        } else {
            match self.farm[vc].type_a_arrival(header.frame_seq_number, self.config.farm_window) {
                Acceptance::Accepted => {}
                Acceptance::Duplicate | Acceptance::LockedOut => return,
                Acceptance::OutOfSequence => {
                    saturating_inc(&mut self.counters.retransmit_errors);
                    // the stream on this channel just broke; a packet
                    // straddling frames cannot complete
                    self.parsers[vc].reset();
                    return;
                }
                Acceptance::Lockout => {
                    saturating_inc(&mut self.counters.lockout_errors);
                    self.parsers[vc].reset();
                    return;
                }
            }
        }

        if header.control_command {
            match parse_control_command(payload) {
                Some(ControlCommand::Unlock) => self.farm[vc].control_unlock(),
                Some(ControlCommand::SetVr(vr)) => self.farm[vc].control_set_vr(vr),
                None => {}
            }
        } else {
            let mut forward = SpForward {
                virtual_channel: header.virtual_channel,
                handler: &mut *self.handler,
            };
            self.parsers[vc].push(payload, &mut forward);
        }
    }
}

struct SpForward<'a, H> {
    virtual_channel: u8,
    handler: &'a mut H,
}

impl<H: SpacecraftHandler> SpacePacketSink for SpForward<'_, H> {
    fn on_space_packet(&mut self, header: &space_packet::SpacePacketHeader, payload: &[u8]) {
        self.handler
            .on_space_packet(self.virtual_channel, header, payload);
    }
}
