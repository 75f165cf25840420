use orchestrator::FunctionName;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};

#[derive(Clone)]
pub struct AppMetrics {
    registry: Registry,
    requests: IntCounterVec,
    request_duration: Histogram,
    dispatches: IntCounterVec,
    rounds: Histogram,
}

impl AppMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();
        let requests = IntCounterVec::new(
            Opts::new("chat_requests_total", "Chat requests by outcome"),
            &["status"],
        )?;
        let request_duration = Histogram::with_opts(HistogramOpts::new(
            "chat_request_duration_seconds",
            "Wall time spent answering a chat request",
        ))?;
        let dispatches = IntCounterVec::new(
            Opts::new("chat_tool_dispatch_total", "Function invocations by outcome"),
            &["function", "status"],
        )?;
        let rounds = Histogram::with_opts(
            HistogramOpts::new("chat_loop_rounds", "Dispatch rounds per conversation")
                .buckets(vec![0.0, 1.0, 2.0, 3.0, 4.0, 6.0, 8.0]),
        )?;
        registry.register(Box::new(requests.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(dispatches.clone()))?;
        registry.register(Box::new(rounds.clone()))?;
        Ok(Self {
            registry,
            requests,
            request_duration,
            dispatches,
            rounds,
        })
    }

    pub fn record_request(&self, status: &str, elapsed_secs: f64) {
        self.requests.with_label_values(&[status]).inc();
        self.request_duration.observe(elapsed_secs);
    }

    /// Names outside the registry share the `unknown` label so model output
    /// cannot grow the series set.
    pub fn record_dispatch(&self, function: &str, is_error: bool) {
        let function = FunctionName::parse(function).map_or("unknown", FunctionName::as_str);
        let status = if is_error { "error" } else { "ok" };
        self.dispatches.with_label_values(&[function, status]).inc();
    }

    pub fn record_rounds(&self, rounds: usize) {
        self.rounds.observe(rounds as f64);
    }

    pub fn render(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_recorded_series() {
        let metrics = AppMetrics::new().unwrap();
        metrics.record_request("answered", 0.25);
        metrics.record_dispatch("search_flight_records", false);
        metrics.record_rounds(2);
        let text = metrics.render().unwrap();
        assert!(text.contains("chat_requests_total{status=\"answered\"} 1"));
        assert!(text.contains(
            "chat_tool_dispatch_total{function=\"search_flight_records\",status=\"ok\"} 1"
        ));
        assert!(text.contains("chat_loop_rounds_count 1"));
    }

    #[test]
    fn undeclared_function_names_share_one_series() {
        let metrics = AppMetrics::new().unwrap();
        for i in 0..50 {
            metrics.record_dispatch(&format!("made_up_function_{i}"), true);
        }
        let text = metrics.render().unwrap();
        let series = text
            .lines()
            .filter(|line| line.starts_with("chat_tool_dispatch_total{"))
            .collect::<Vec<_>>();
        assert_eq!(
            series,
            vec!["chat_tool_dispatch_total{function=\"unknown\",status=\"error\"} 50"]
        );
    }
}
