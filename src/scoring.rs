use crate::proxy::Proxy;

/// What the store should do with a proxy after it was re-checked.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Probe succeeded, score back at the ceiling.
    Restore(Proxy),
    /// Probe failed, only the score changed.
    Demote(Proxy),
    /// Score ran out, drop the record with this ip.
    Evict(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ScoringPolicy {
    pub max_score: u32,
}

impl ScoringPolicy {
    pub fn new(max_score: u32) -> Self {
        ScoringPolicy { max_score }
    }

    /// `stored` is the record as read at cycle start, `checked` the same proxy
    /// after validation. A failed check keeps the stored capability fields.
    pub fn apply(&self, stored: Proxy, checked: Proxy) -> Verdict {
        if checked.is_working() {
            let mut proxy = checked;
            proxy.score = self.max_score;
            return Verdict::Restore(proxy);
        }

        let mut proxy = stored;
        proxy.score = proxy.score.min(self.max_score).saturating_sub(1);
        if proxy.score == 0 {
            Verdict::Evict(proxy.ip)
        } else {
            Verdict::Demote(proxy)
        }
    }
}
