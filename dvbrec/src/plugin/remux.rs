//! TS to PES remultiplexing with picture indexing.

use std::collections::HashMap;

use log::{debug, trace, warn};

use super::OutputPlugin;
use crate::error::PluginError;
use crate::ring_buffer::{Frame, FrameKind, FrameRingBuffer};
use crate::ts::packet::{payload, TsHeader, TS_PACKET_SIZE};

/// Byte budget of the queue between the remuxer and the output buffer.
pub const DEFAULT_QUEUE_SIZE: usize = 1024 * 1024;

const PES_START_CODE: [u8; 3] = [0x00, 0x00, 0x01];
const PICTURE_START_CODE: u8 = 0x00;

/// A complete PES packet as produced by a [`PesRemuxer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PesPacket {
    pub pid: u16,
    pub kind: FrameKind,
    pub data: Vec<u8>,
}

/// Turns TS packets into PES packets.
pub trait PesRemuxer {
    /// Feed one 188-byte TS packet.
    fn put_ts(&mut self, packet: &[u8]);

    /// PES packets completed since the last call.
    fn take_packets(&mut self) -> Vec<PesPacket>;

    /// Complete whatever is still being assembled.
    fn finish(&mut self) -> Vec<PesPacket>;
}

/// MPEG-2 picture coding type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PictureType {
    I,
    P,
    B,
}

impl PictureType {
    fn from_coding_type(value: u8) -> Option<Self> {
        match value {
            1 => Some(PictureType::I),
            2 => Some(PictureType::P),
            3 => Some(PictureType::B),
            _ => None,
        }
    }
}

/// A picture boundary in the remuxed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureMark {
    /// Offset in the output of the PES packet carrying the picture.
    pub offset: u64,
    pub picture: PictureType,
    /// Index of that PES packet.
    pub frame_index: u64,
}

struct Assembly {
    kind: FrameKind,
    data: Vec<u8>,
}

/// Reassembles PES packets per PID from payload-unit-start boundaries.
///
/// Packets with a PES length complete as soon as all their bytes arrived;
/// unbounded ones (video) complete when the next unit starts.
#[derive(Default)]
pub struct PesAssembler {
    assemblies: HashMap<u16, Assembly>,
    ready: Vec<PesPacket>,
}

impl PesAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    fn complete(&mut self, pid: u16) {
        if let Some(assembly) = self.assemblies.remove(&pid) {
            if !assembly.data.is_empty() {
                self.ready.push(PesPacket {
                    pid,
                    kind: assembly.kind,
                    data: assembly.data,
                });
            }
        }
    }
}

fn stream_kind(stream_id: u8) -> FrameKind {
    match stream_id {
        0xE0..=0xEF => FrameKind::Video,
        0xC0..=0xDF => FrameKind::Audio,
        0xBD => FrameKind::Ancillary,
        _ => FrameKind::Unknown,
    }
}

/// Total size announced by the PES header, if bounded.
fn pes_length(data: &[u8]) -> Option<usize> {
    if data.len() < 6 {
        return None;
    }
    match u16::from_be_bytes([data[4], data[5]]) {
        0 => None,
        len => Some(6 + len as usize),
    }
}

impl PesRemuxer for PesAssembler {
    fn put_ts(&mut self, packet: &[u8]) {
        let Some(header) = TsHeader::parse(packet) else {
            return;
        };
        if header.transport_error {
            return;
        }
        let data = payload(packet);
        if data.is_empty() {
            return;
        }

        if header.payload_unit_start {
            self.complete(header.pid);
            if data.len() < 4 || data[..3] != PES_START_CODE {
                trace!("[Remux] PID 0x{:04X}: unit start without PES header", header.pid);
                return;
            }
            self.assemblies.insert(
                header.pid,
                Assembly {
                    kind: stream_kind(data[3]),
                    data: data.to_vec(),
                },
            );
        } else if let Some(assembly) = self.assemblies.get_mut(&header.pid) {
            assembly.data.extend_from_slice(data);
        } else {
            // Joined mid-unit; wait for the next start.
            return;
        }

        let complete = match self.assemblies.get_mut(&header.pid) {
            Some(assembly) => match pes_length(&assembly.data) {
                Some(len) if assembly.data.len() >= len => {
                    assembly.data.truncate(len);
                    true
                }
                _ => false,
            },
            None => false,
        };
        if complete {
            self.complete(header.pid);
        }
    }

    fn take_packets(&mut self) -> Vec<PesPacket> {
        std::mem::take(&mut self.ready)
    }

    fn finish(&mut self) -> Vec<PesPacket> {
        let mut pids: Vec<u16> = self.assemblies.keys().copied().collect();
        pids.sort_unstable();
        for pid in pids {
            self.complete(pid);
        }
        self.take_packets()
    }
}

/// Picture types found in a video PES packet, in order.
fn scan_pictures(data: &[u8]) -> Vec<PictureType> {
    let mut pictures = Vec::new();
    let mut i = 0;
    while i + 5 < data.len() {
        if data[i..i + 3] == PES_START_CODE && data[i + 3] == PICTURE_START_CODE {
            if let Some(picture) = PictureType::from_coding_type((data[i + 5] >> 3) & 0x07) {
                pictures.push(picture);
            }
            i += 4;
        } else {
            i += 1;
        }
    }
    pictures
}

/// Output plugin turning TS into a PES stream.
pub struct Remux<R: PesRemuxer = PesAssembler> {
    remuxer: R,
    input: Vec<u8>,
    queue: FrameRingBuffer,
    next_index: u64,
    output: Vec<u8>,
    output_offset: u64,
    marks: Vec<PictureMark>,
}

impl Default for Remux<PesAssembler> {
    fn default() -> Self {
        Self::new()
    }
}

impl Remux<PesAssembler> {
    pub fn new() -> Self {
        Self::with_remuxer(PesAssembler::new(), DEFAULT_QUEUE_SIZE)
    }
}

impl<R: PesRemuxer> Remux<R> {
    pub fn with_remuxer(remuxer: R, queue_size: usize) -> Self {
        Self {
            remuxer,
            input: Vec::new(),
            queue: FrameRingBuffer::new(queue_size),
            next_index: 0,
            output: Vec::new(),
            output_offset: 0,
            marks: Vec::new(),
        }
    }

    /// Picture boundaries recorded since the last call, for an index writer.
    pub fn take_picture_marks(&mut self) -> Vec<PictureMark> {
        std::mem::take(&mut self.marks)
    }

    fn enqueue(&mut self, packets: Vec<PesPacket>) {
        for packet in packets {
            let frame = Frame::new(self.next_index, packet.kind, packet.data);
            self.next_index += 1;

            if let Err(frame) = self.queue.put(frame) {
                self.drain();
                if let Err(frame) = self.queue.put(frame) {
                    warn!(
                        "[Remux] PES packet of {} bytes exceeds the queue, passing it through",
                        frame.len()
                    );
                    self.emit(frame);
                }
            }
        }
    }

    fn drain(&mut self) {
        while let Some(frame) = self.queue.drop_frame() {
            self.emit(frame);
        }
    }

    fn emit(&mut self, frame: Frame) {
        if frame.kind == FrameKind::Video {
            for picture in scan_pictures(&frame.data) {
                self.marks.push(PictureMark {
                    offset: self.output_offset,
                    picture,
                    frame_index: frame.index,
                });
            }
        }
        self.output_offset += frame.len() as u64;
        self.output.extend_from_slice(&frame.data);
    }
}

impl<R: PesRemuxer> OutputPlugin for Remux<R> {
    fn name(&self) -> &str {
        "remux"
    }

    fn add_data(&mut self, data: &[u8]) {
        self.input.extend_from_slice(data);
    }

    fn process_data(&mut self) -> Result<(), PluginError> {
        let whole = self.input.len() / TS_PACKET_SIZE * TS_PACKET_SIZE;
        for packet in self.input[..whole].chunks_exact(TS_PACKET_SIZE) {
            self.remuxer.put_ts(packet);
        }
        self.input.drain(..whole);

        let packets = self.remuxer.take_packets();
        if !packets.is_empty() {
            trace!("[Remux] {} PES packets", packets.len());
        }
        self.enqueue(packets);
        self.drain();
        Ok(())
    }

    fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.output)
    }

    fn flush(&mut self) -> Result<(), PluginError> {
        self.process_data()?;
        let rest = self.remuxer.finish();
        if !rest.is_empty() {
            debug!("[Remux] Flushing {} incomplete PES packets", rest.len());
        }
        self.enqueue(rest);
        self.drain();
        Ok(())
    }
}
