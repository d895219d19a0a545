//! Relative and delta timestamps for a loaded sequence.

use tracing::debug;

use super::Sequence;

/// Fill `ts_rel` (since the first frame) and `ts_diff` (since the previous
/// frame) for every node. The first node gets zero for both.
pub fn normalize_timing(seq: &mut Sequence) {
    let Some(start) = seq.node(0).map(|n| n.frame.timestamp()) else {
        return;
    };

    let mut previous = start;
    for node in seq.nodes_mut() {
        let ts = node.frame.timestamp();
        node.attr.ts_rel = ts.diff(&start);
        node.attr.ts_diff = ts.diff(&previous);
        previous = ts;
    }

    if let Some(last) = seq.nodes().last() {
        debug!("Normalized timing for {} packets spanning {}s", seq.len(), last.attr.ts_rel);
    }
}
