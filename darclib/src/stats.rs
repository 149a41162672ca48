//! Pipeline counters.
//!
//! Every decoder keeps its own plain counters; [`crate::decoder::DarcDecoder`]
//! aggregates them into this snapshot for logging and monitoring.

/// A point-in-time view of the pipeline counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    /// Blocks emitted by the block decoder.
    pub blocks_decoded: u64,
    /// Blocks whose DSCC syndrome had no table entry.
    pub blocks_uncorrectable: u64,
    /// Non-0/1 inputs fed to `push_bit`.
    pub invalid_bits: u64,
    /// Frames assembled.
    pub frames_decoded: u64,
    /// Frame buffers discarded for BIC sequence violations.
    pub frame_sequence_resets: u64,
    /// Data groups completed.
    pub groups_decoded: u64,
    /// Packets dropped because their group had no open buffer.
    pub missing_first_drops: u64,
    /// Group buffers evicted by the size caps.
    pub group_evictions: u64,
    /// L5 records decoded.
    pub events_decoded: u64,
    /// Groups whose L5 payload failed to decode.
    pub decode_errors: u64,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "blocks={} (uncorrectable={}), frames={} (resets={}), groups={} \
             (orphan packets={}, evictions={}), events={} (errors={})",
            self.blocks_decoded,
            self.blocks_uncorrectable,
            self.frames_decoded,
            self.frame_sequence_resets,
            self.groups_decoded,
            self.missing_first_drops,
            self.group_evictions,
            self.events_decoded,
            self.decode_errors,
        )
    }
}
