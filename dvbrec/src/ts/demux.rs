//! PID demultiplexer feeding registered output plugins.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use log::{debug, trace, warn};

use super::packet::{TsHeader, NULL_PID, SYNC_BYTE, TS_PACKET_SIZE};
use crate::plugin::OutputPlugin;

/// Handle of a sink registered with [`Demux::add_filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FilterId(u32);

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outcome of one [`Demux::process_data`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Sync-aligned frames walked, whether or not anyone subscribed to them.
    pub frames: usize,
    /// Bytes discarded while looking for sync.
    pub dropped: usize,
    /// Bytes removed from the front of the buffer (frames plus dropped bytes).
    pub consumed: usize,
}

/// Running counters over everything the demux has seen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxStats {
    pub frames: u64,
    pub transport_errors: u64,
    pub scrambled: u64,
    pub discontinuities: u64,
    pub resyncs: u64,
    pub dropped_bytes: u64,
}

struct Filter {
    pids: Vec<u16>,
    sink: Box<dyn OutputPlugin>,
}

/// Splits a TS byte stream into 188-byte frames and hands each frame to the
/// sinks registered for its PID.
pub struct Demux {
    buffer: Vec<u8>,
    filters: BTreeMap<FilterId, Filter>,
    pid_index: HashMap<u16, Vec<FilterId>>,
    last_cc: HashMap<u16, u8>,
    next_id: u32,
    stats: DemuxStats,
}

impl Default for Demux {
    fn default() -> Self {
        Self::new()
    }
}

impl Demux {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(TS_PACKET_SIZE * 64),
            filters: BTreeMap::new(),
            pid_index: HashMap::new(),
            last_cc: HashMap::new(),
            next_id: 1,
            stats: DemuxStats::default(),
        }
    }

    /// Route frames of every PID in `pids` to `sink`.
    ///
    /// A sink listed under several PIDs still gets each frame once.
    pub fn add_filter(&mut self, pids: &[u16], sink: Box<dyn OutputPlugin>) -> FilterId {
        let id = FilterId(self.next_id);
        self.next_id += 1;

        let mut pids = pids.to_vec();
        pids.sort_unstable();
        pids.dedup();
        for &pid in &pids {
            self.pid_index.entry(pid).or_default().push(id);
        }
        debug!(
            "[Demux] Filter {} ({}) added for PIDs {:?}",
            id,
            sink.name(),
            pids
        );
        self.filters.insert(id, Filter { pids, sink });
        id
    }

    /// Unregister a filter and hand its sink back. `None` for unknown ids.
    pub fn remove_filter(&mut self, id: FilterId) -> Option<Box<dyn OutputPlugin>> {
        let filter = self.filters.remove(&id)?;
        for pid in &filter.pids {
            if let Some(ids) = self.pid_index.get_mut(pid) {
                ids.retain(|other| *other != id);
                if ids.is_empty() {
                    self.pid_index.remove(pid);
                }
            }
        }
        debug!("[Demux] Filter {} ({}) removed", id, filter.sink.name());
        Some(filter.sink)
    }

    pub fn filter_count(&self) -> usize {
        self.filters.len()
    }

    /// PIDs with at least one subscriber, ascending.
    pub fn pids(&self) -> Vec<u16> {
        let mut pids: Vec<u16> = self.pid_index.keys().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Append raw stream bytes. Nothing is dispatched until `process_data`.
    pub fn add_data(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes waiting for the next pass.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Discard buffered bytes and continuity state, e.g. after a retune.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.last_cc.clear();
    }

    pub fn stats(&self) -> DemuxStats {
        self.stats
    }

    /// Dispatch every complete frame in the buffer.
    ///
    /// Frames reach their sinks in stream order and every sink that received
    /// data is processed exactly once at the end of the pass. A trailing
    /// partial frame stays buffered.
    pub fn process_data(&mut self) -> ScanReport {
        let mut report = ScanReport::default();
        let len = self.buffer.len();
        if len < TS_PACKET_SIZE * 2 {
            return report;
        }

        let Some(start) = find_sync(&self.buffer) else {
            warn!("[Demux] No TS sync in {} bytes, discarding buffer", len);
            self.buffer.clear();
            self.stats.dropped_bytes += len as u64;
            report.dropped = len;
            report.consumed = len;
            return report;
        };
        if start > 0 {
            warn!("[Demux] Resync TS: dropping {} bytes", start);
        }

        let Self {
            buffer,
            filters,
            pid_index,
            last_cc,
            stats,
            ..
        } = self;

        let mut touched = BTreeSet::new();
        let mut offset = start;
        report.dropped = start;

        while offset + TS_PACKET_SIZE <= len {
            if buffer[offset] != SYNC_BYTE {
                let next = buffer[offset + 1..]
                    .iter()
                    .position(|&b| b == SYNC_BYTE)
                    .map_or(len, |p| offset + 1 + p);
                warn!(
                    "[Demux] Lost sync at offset {}, skipping {} bytes",
                    offset,
                    next - offset
                );
                stats.resyncs += 1;
                report.dropped += next - offset;
                offset = next;
                continue;
            }

            let frame = &buffer[offset..offset + TS_PACKET_SIZE];
            if let Some(header) = TsHeader::parse(frame) {
                track_quality(stats, last_cc, &header);
                if let Some(ids) = pid_index.get(&header.pid) {
                    for id in ids {
                        if let Some(filter) = filters.get_mut(id) {
                            filter.sink.add_data(frame);
                            touched.insert(*id);
                        }
                    }
                }
            }
            report.frames += 1;
            offset += TS_PACKET_SIZE;
        }

        buffer.drain(..offset);
        report.consumed = offset;
        stats.frames += report.frames as u64;
        stats.dropped_bytes += report.dropped as u64;

        for id in touched {
            if let Some(filter) = filters.get_mut(&id) {
                if let Err(e) = filter.sink.process_data() {
                    warn!("[Demux] Filter {} ({}): {}", id, filter.sink.name(), e);
                }
            }
        }

        trace!(
            "[Demux] {} frames, {} dropped, {} pending",
            report.frames,
            report.dropped,
            buffer.len()
        );
        report
    }
}

/// Offset `i < 188` where two consecutive frames start, if any.
fn find_sync(buf: &[u8]) -> Option<usize> {
    (0..TS_PACKET_SIZE)
        .take_while(|i| i + TS_PACKET_SIZE < buf.len())
        .find(|&i| buf[i] == SYNC_BYTE && buf[i + TS_PACKET_SIZE] == SYNC_BYTE)
}

fn track_quality(stats: &mut DemuxStats, last_cc: &mut HashMap<u16, u8>, header: &TsHeader) {
    if header.transport_error {
        stats.transport_errors += 1;
        warn!("[Demux] Transport error on PID 0x{:04X}", header.pid);
    }
    if header.is_scrambled() {
        stats.scrambled += 1;
        trace!("[Demux] Scrambled frame on PID 0x{:04X}", header.pid);
    }

    if header.pid == NULL_PID || !header.has_payload() {
        return;
    }
    let cc = header.continuity_counter;
    if let Some(prev) = last_cc.insert(header.pid, cc) {
        // A repeated counter is a legal duplicate packet.
        if cc != (prev + 1) & 0x0F && cc != prev {
            stats.discontinuities += 1;
            debug!(
                "[Demux] CC discontinuity on PID 0x{:04X}: {} -> {}",
                header.pid, prev, cc
            );
        }
    }
}
