//! MPEG Transport Stream parsing and PID demultiplexing.

mod demux;
pub mod packet;

pub use demux::{Demux, DemuxStats, FilterId, ScanReport};
pub use packet::{TsHeader, NULL_PID, SYNC_BYTE, TS_PACKET_SIZE};
