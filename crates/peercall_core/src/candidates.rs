/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - PeerCall Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use std::collections::VecDeque;

use peercall_protocol::IceCandidate;

/// Candidates held back until the description they belong to is committed.
/// Drained strictly in arrival order.
#[derive(Debug, Default, Clone)]
pub struct CandidateBuffer {
    queue: VecDeque<IceCandidate>,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: IceCandidate) {
        self.queue.push_back(candidate);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = IceCandidate> + '_ {
        self.queue.drain(..)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_insertion_order() {
        let mut buf = CandidateBuffer::new();
        for i in 0..5u32 {
            buf.push(IceCandidate::new("0", i, format!("candidate:{i}")));
        }
        assert_eq!(buf.len(), 5);
        let order: Vec<u32> = buf.drain().map(|c| c.sdp_mline_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert!(buf.is_empty());
    }

    #[test]
    fn clear_drops_everything() {
        let mut buf = CandidateBuffer::new();
        buf.push(IceCandidate::new("audio", 0, "candidate:a"));
        buf.clear();
        assert_eq!(buf.drain().count(), 0);
    }
}
