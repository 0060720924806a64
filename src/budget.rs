/// Average vision-model token counts for a 300 DPI scan page.
const AVG_IMAGE_TOKENS: u64 = 1200;
const AVG_OUTPUT_TOKENS: u64 = 800;

/// (input, output) price per 1M tokens, USD.
const MODEL_PRICING: &[(&str, (f64, f64))] = &[
    ("google/gemini-2.5-flash", (0.10, 0.40)),
    ("google/gemini-2.0-flash", (0.10, 0.40)),
];
// Conservative fallback for models without a table entry.
const DEFAULT_PRICING: (f64, f64) = (1.0, 2.0);

pub fn model_pricing(model: &str) -> (f64, f64) {
    MODEL_PRICING
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, pricing)| *pricing)
        .unwrap_or(DEFAULT_PRICING)
}

/// Estimated total API cost in USD for processing `pages` scans.
pub fn estimate(pages: usize, model: &str) -> f64 {
    let (input_price, output_price) = model_pricing(model);
    let input_tokens = (pages as u64 * AVG_IMAGE_TOKENS) as f64;
    let output_tokens = (pages as u64 * AVG_OUTPUT_TOKENS) as f64;
    (input_tokens * input_price + output_tokens * output_price) / 1_000_000.0
}

/// Running spend across a cloud run. Dispatch stops once the budget is
/// exceeded; pages already in flight still complete.
#[derive(Debug)]
pub struct BudgetTracker {
    budget: f64,
    spent: f64,
}

impl BudgetTracker {
    pub fn new(budget: f64) -> Self {
        Self { budget, spent: 0.0 }
    }

    pub fn record(&mut self, cost: f64) {
        self.spent += cost;
    }

    pub fn spent(&self) -> f64 {
        self.spent
    }

    pub fn exceeded(&self) -> bool {
        self.spent > self.budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_known_model() {
        // 1200 * 0.10 + 800 * 0.40 = 440 micro-dollars per page.
        let cost = estimate(100, "google/gemini-2.5-flash");
        assert!((cost - 0.044).abs() < 1e-9);
    }

    #[test]
    fn estimate_unknown_model_uses_fallback() {
        // 1200 * 1.0 + 800 * 2.0 = 2800 micro-dollars per page.
        let cost = estimate(10, "someone/some-model");
        assert!((cost - 0.028).abs() < 1e-9);
    }

    #[test]
    fn zero_pages_cost_nothing() {
        assert_eq!(estimate(0, "google/gemini-2.5-flash"), 0.0);
    }

    #[test]
    fn tracker_exceeded_only_past_budget() {
        let mut tracker = BudgetTracker::new(1.0);
        tracker.record(0.6);
        assert!(!tracker.exceeded());
        tracker.record(0.4);
        assert!(!tracker.exceeded());
        tracker.record(0.01);
        assert!(tracker.exceeded());
        assert!((tracker.spent() - 1.01).abs() < 1e-9);
    }
}
