/// A lightweight snapshot of runtime "signals" (facts only, no policy).
///
/// One entry per admission gate that has been used since the gateway was built.
#[derive(Debug, Clone, Default)]
pub struct SignalsSnapshot {
    pub inflight: Vec<InflightSnapshot>,
}

impl SignalsSnapshot {
    /// Gate for `provider_id`, if one exists. With several limits configured
    /// over time, the first one found is returned.
    pub fn for_provider(&self, provider_id: &str) -> Option<&InflightSnapshot> {
        self.inflight.iter().find(|s| s.provider_id == provider_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InflightSnapshot {
    pub provider_id: String,
    pub max: usize,
    pub available: usize,
    pub in_use: usize,
}
