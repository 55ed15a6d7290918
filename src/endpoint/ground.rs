//! The ground side: telecommand emission with frame sequence numbers,
//! telemetry reception with CLCW mirroring and frame-count accounting.

use tracing::{debug, trace};

use crate::clcw::Clcw;
use crate::cltu;
use crate::config::{Config, ConfigError};
use crate::frame::tc::{self, TcFrameHeader};
use crate::frame::tm::{self, TmDecoder, TmFrameHeader, TmFrameSink};
use crate::frame::ASM;
use crate::space_packet::{self, PacketType, Parser, SequenceFlags, SpacePacketSink};
use crate::{saturating_inc, EncodeError};

use super::GroundHandler;

/// COP Set-V(R)=0 directive
const SET_VR: [u8; 3] = [0x82, 0x00, 0x00];
/// COP Unlock directive
const UNLOCK: [u8; 1] = [0x00];

#[derive(Default)]
struct DownlinkCounters {
    scid_errors: u16,
    mcfc_errors: u16,
    vcfc_errors: u16,
}

/// The ground station coordinator.
///
/// Sends telecommands through [`send_tc`](Ground::send_tc) and feeds
/// received telemetry through [`process_tm`](Ground::process_tm); decoded
/// packets, CLCWs and outgoing uplink bytes reach the caller through its
/// [`GroundHandler`]. There is no retransmission buffer: the mirrored COP
/// state surfaces the retransmit and lockout flags and the operator decides
/// what to resend.
pub struct Ground {
    config: Config,
    tm: TmDecoder,
    parsers: Vec<Parser>,
    /// Last CLCW received per telecommand channel
    cop: Vec<Option<Clcw>>,
    /// Frame sequence number N(S) of the next type-A frame per channel
    next_fsn: Vec<u8>,
    expected_mcfc: Option<u8>,
    expected_vcfc: Vec<Option<u8>>,
    counters: DownlinkCounters,
    sp_buf: Vec<u8>,
    tc_buf: Vec<u8>,
    cltu_buf: Vec<u8>,
}

impl Ground {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let tc_area = config.tc_frame_max_size
            - tc::PRIMARY_HEADER_SIZE
            - usize::from(config.tc_segment_header)
            - if config.use_fecf { crate::frame::FECF_SIZE } else { 0 };
        Ok(Self {
            tm: TmDecoder::new(config.tm_frame_size, config.use_ocf, config.use_fecf),
            parsers: (0..config.max_tm_channels)
                .map(|_| Parser::new(config.sp_max_data_size))
                .collect(),
            cop: vec![None; config.max_tc_channels],
            next_fsn: vec![0; config.max_tc_channels],
            expected_mcfc: None,
            expected_vcfc: vec![None; config.max_tm_channels],
            counters: DownlinkCounters::default(),
            sp_buf: vec![0; tc_area.max(SET_VR.len())],
            tc_buf: vec![0; config.tc_frame_max_size],
            cltu_buf: vec![0; cltu::encoded_len(config.tc_frame_max_size)],
            config,
        })
    }

    /// Feeds downlink bytes (ASM-framed telemetry stream).
    pub fn process_tm<H: GroundHandler>(&mut self, bytes: &[u8], handler: &mut H) {
        let mut sink = TmForward {
            config: &self.config,
            parsers: &mut self.parsers,
            cop: &mut self.cop,
            expected_mcfc: &mut self.expected_mcfc,
            expected_vcfc: &mut self.expected_vcfc,
            counters: &mut self.counters,
            handler,
        };
        self.tm.push(bytes, &mut sink);
    }

    /// Wraps `payload` as a space packet in a TC frame and emits it.
    ///
    /// `bypass` selects BD mode; in AD mode the frame carries this
    /// channel's sequence number, which then advances.
    pub fn send_tc<H: GroundHandler>(
        &mut self,
        virtual_channel: u8,
        bypass: bool,
        apid: u16,
        sequence_count: u16,
        payload: &[u8],
        handler: &mut H,
    ) -> Result<(), EncodeError> {
        if usize::from(virtual_channel) >= self.config.max_tc_channels {
            return Err(EncodeError::InvalidChannel);
        }
        if space_packet::HEADER_SIZE + payload.len() > self.sp_buf.len() {
            return Err(EncodeError::PayloadTooLarge);
        }
        let used = space_packet::encode(
            PacketType::Telecommand,
            SequenceFlags::Unsegmented,
            apid,
            sequence_count,
            None,
            payload,
            &mut self.sp_buf,
        )?;
        self.send_frame(virtual_channel, bypass, false, used, handler)
    }

    /// Initializes AD mode on a channel: resets the local sequence number
    /// and sends `Set V(R) = 0` followed by `Unlock` as bypass control
    /// commands.
    pub fn send_init_ad<H: GroundHandler>(
        &mut self,
        virtual_channel: u8,
        handler: &mut H,
    ) -> Result<(), EncodeError> {
        if usize::from(virtual_channel) >= self.config.max_tc_channels {
            return Err(EncodeError::InvalidChannel);
        }
        self.next_fsn[usize::from(virtual_channel)] = 0;
        self.sp_buf[..SET_VR.len()].copy_from_slice(&SET_VR);
        self.send_frame(virtual_channel, true, true, SET_VR.len(), handler)?;
        self.sp_buf[..UNLOCK.len()].copy_from_slice(&UNLOCK);
        self.send_frame(virtual_channel, true, true, UNLOCK.len(), handler)
    }

    fn send_frame<H: GroundHandler>(
        &mut self,
        virtual_channel: u8,
        bypass: bool,
        control_command: bool,
        data_len: usize,
        handler: &mut H,
    ) -> Result<(), EncodeError> {
        let vc = usize::from(virtual_channel);
        let header = TcFrameHeader {
            bypass,
            control_command,
            spacecraft_id: self.config.scids[0],
            virtual_channel,
            frame_seq_number: self.next_fsn[vc],
            map: 0,
        };
        let n = tc::encode(
            &header,
            &self.sp_buf[..data_len],
            self.config.tc_segment_header,
            self.config.use_fecf,
            &mut self.tc_buf,
        )?;
        if !bypass && !control_command {
            self.next_fsn[vc] = self.next_fsn[vc].wrapping_add(1);
        }
        trace!(
            virtual_channel,
            bypass,
            control_command,
            fsn = header.frame_seq_number,
            "telecommand frame emitted"
        );
        if self.config.use_cltu {
            let m = cltu::encode(&self.tc_buf[..n], &mut self.cltu_buf)?;
            handler.on_tc_bytes(&self.cltu_buf[..m]);
        } else {
            handler.on_tc_bytes(&ASM);
            handler.on_tc_bytes(&self.tc_buf[..n]);
        }
        Ok(())
    }

    /// Last CLCW received for a telecommand channel.
    pub fn last_clcw(&self, virtual_channel: u8) -> Option<Clcw> {
        self.cop.get(usize::from(virtual_channel)).copied().flatten()
    }

    /// Sequence number the next type-A frame on a channel will carry.
    pub fn next_fsn(&self, virtual_channel: u8) -> Option<u8> {
        self.next_fsn.get(usize::from(virtual_channel)).copied()
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

    pub fn mcfc_error_count(&self) -> u16 {
        self.counters.mcfc_errors
    }

    pub fn vcfc_error_count(&self) -> u16 {
        self.counters.vcfc_errors
    }

    pub fn tm_sync_error_count(&self) -> u16 {
        self.tm.sync_error_count()
    }

    pub fn tm_checksum_error_count(&self) -> u16 {
        self.tm.checksum_error_count()
    }

    pub fn tm_overflow_error_count(&self) -> u16 {
        self.tm.overflow_error_count()
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

    /// Clears every error counter of the downlink path.
    pub fn clear_error_counters(&mut self) {
        self.counters = DownlinkCounters::default();
        self.tm.clear_error_counters();
        for parser in &mut self.parsers {
            parser.clear_error_counters();
        }
    }
}

struct TmForward<'a, H> {
    config: &'a Config,
    parsers: &'a mut [Parser],
    cop: &'a mut [Option<Clcw>],
    expected_mcfc: &'a mut Option<u8>,
    expected_vcfc: &'a mut [Option<u8>],
    counters: &'a mut DownlinkCounters,
    handler: &'a mut H,
}

impl<H: GroundHandler> TmFrameSink for TmForward<'_, H> {
    fn on_tm_frame(&mut self, header: &TmFrameHeader, payload: &[u8], ocf: Option<u32>) {
        if !self.config.scids.contains(&header.spacecraft_id) {
            debug!(
                scid = header.spacecraft_id,
                "frame from a foreign spacecraft dropped"
            );
            saturating_inc(&mut self.counters.scid_errors);
            return;
        }

        if let Some(word) = ocf {
            match Clcw::extract(word) {
                Ok(clcw) => {
                    // the word names the telecommand channel it reports on
                    if let Some(slot) = self.cop.get_mut(usize::from(clcw.virtual_channel)) {
                        *slot = Some(clcw);
                    }
                    self.handler.on_clcw(header.virtual_channel, clcw);
                }
                Err(_) => debug!(word, "undecodable CLCW in OCF ignored"),
            }
        }

        if let Some(expected) = *self.expected_mcfc {
            if expected != header.master_frame_count {
                debug!(
                    expected,
                    got = header.master_frame_count,
                    "master channel frame count gap"
                );
                saturating_inc(&mut self.counters.mcfc_errors);
            }
        }
        *self.expected_mcfc = Some(header.master_frame_count.wrapping_add(1));

        let vc = usize::from(header.virtual_channel);
        if let Some(slot) = self.expected_vcfc.get_mut(vc) {
            if let Some(expected) = *slot {
                if expected != header.virtual_frame_count {
                    debug!(
                        virtual_channel = header.virtual_channel,
                        expected,
                        got = header.virtual_frame_count,
                        "virtual channel frame count gap"
                    );
                    saturating_inc(&mut self.counters.vcfc_errors);
                }
            }
            *slot = Some(header.virtual_frame_count.wrapping_add(1));
        }

        // idle frames carry fill, not packets
        if header.first_header_pointer == tm::IDLE_FIRST_HEADER_POINTER {
            return;
        }
        if vc < self.parsers.len() {
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

impl<H: GroundHandler> SpacePacketSink for SpForward<'_, H> {
    fn on_space_packet(&mut self, header: &space_packet::SpacePacketHeader, payload: &[u8]) {
        self.handler
            .on_space_packet(self.virtual_channel, header, payload);
    }
}
