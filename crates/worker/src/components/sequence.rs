use std::collections::HashMap;

/// 单条序列号的检查结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeqCheck {
    /// 第一条或紧接上一条
    InOrder,
    /// 中间缺少了消息
    Gap { expected: u64, got: u64 },
    /// 不大于已见过的序列号（重复或Manager重启）
    Stale { last: u64, got: u64 },
}

/// 按队列记录最后看到的序列号
#[derive(Debug, Default)]
pub struct SequenceTracker {
    last: HashMap<String, u64>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 检查并记录序列号
    ///
    /// 队列的第一条消息总是视为有序。任何情况下都会记录 `seq`，
    /// 这样Manager重启导致序列号回到 1 之后可以继续校验。
    pub fn observe(&mut self, queue: &str, seq: u64) -> SeqCheck {
        let check = match self.last.get(queue) {
            None => SeqCheck::InOrder,
            Some(&last) if seq == last + 1 => SeqCheck::InOrder,
            Some(&last) if seq > last => SeqCheck::Gap {
                expected: last + 1,
                got: seq,
            },
            Some(&last) => SeqCheck::Stale { last, got: seq },
        };
        self.last.insert(queue.to_string(), seq);
        check
    }

    pub fn last(&self, queue: &str) -> Option<u64> {
        self.last.get(queue).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_checks() {
        let mut tracker = SequenceTracker::new();
        assert_eq!(tracker.observe("wq_1", 1), SeqCheck::InOrder);
        assert_eq!(tracker.observe("wq_1", 2), SeqCheck::InOrder);
        assert_eq!(
            tracker.observe("wq_1", 5),
            SeqCheck::Gap {
                expected: 3,
                got: 5
            }
        );
        assert_eq!(tracker.observe("wq_1", 1), SeqCheck::Stale { last: 5, got: 1 });
        assert_eq!(tracker.observe("wq_1", 2), SeqCheck::InOrder);

        // 队列之间互不影响
        assert_eq!(tracker.observe("pq_1", 7), SeqCheck::InOrder);
        assert_eq!(tracker.last("pq_1"), Some(7));
        assert_eq!(tracker.last("nope"), None);
    }
}
