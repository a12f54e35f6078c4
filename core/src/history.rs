//! Loop-suppression history (§3, §4.7, §9): a small bounded ring of recent
//! `FILE` request fingerprints, purposely shallow by design — implementers
//! are told to keep it this shape, not grow it into a consistency protocol.

use std::collections::VecDeque;

use transport::protocol::FileRequest;

const CAPACITY: usize = 4;

type Fingerprint = (transport::protocol::FileAction, String, usize);

/// Bounded fingerprint ring shared by an endpoint's send and receive paths.
#[derive(Debug, Default)]
pub struct LoopSuppression {
    ring: VecDeque<Fingerprint>,
}

impl LoopSuppression {
    #[must_use]
    pub fn new() -> Self {
        Self {
            ring: VecDeque::with_capacity(CAPACITY),
        }
    }

    /// Records `request`'s fingerprint, evicting the oldest entry if full.
    pub fn push(&mut self, request: &FileRequest) {
        if self.ring.len() == CAPACITY {
            self.ring.pop_front();
        }
        self.ring.push_back(request.fingerprint());
    }

    /// True if `request`'s fingerprint matches any of the last [`CAPACITY`] entries.
    #[must_use]
    pub fn contains(&self, request: &FileRequest) -> bool {
        let fingerprint = request.fingerprint();
        self.ring.iter().any(|f| *f == fingerprint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use transport::protocol::{FileAction, FileRequest};

    fn file_req(src: &str, len: usize) -> FileRequest {
        FileRequest::with_content(FileAction::Update, src.to_string(), vec![0u8; len])
    }

    #[test]
    fn suppresses_within_capacity() {
        let mut history = LoopSuppression::new();
        history.push(&file_req("a.txt", 2));
        assert!(history.contains(&file_req("a.txt", 2)));
        assert!(!history.contains(&file_req("a.txt", 3)));
    }

    #[test]
    fn evicts_oldest_past_capacity() {
        let mut history = LoopSuppression::new();
        for i in 0..CAPACITY {
            history.push(&file_req(&format!("f{i}.txt"), 1));
        }
        assert!(history.contains(&file_req("f0.txt", 1)));
        history.push(&file_req("new.txt", 1));
        assert!(!history.contains(&file_req("f0.txt", 1)));
        assert!(history.contains(&file_req("new.txt", 1)));
    }
}
