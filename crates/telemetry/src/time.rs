use crate::sinks::RpcMetricsSink;
use std::time::Instant;

/// RAII timer observing a request's duration on drop.
pub struct RequestTimer<'a> {
    sink: &'a dyn RpcMetricsSink,
    route: &'static str,
    start: Instant,
}

impl<'a> RequestTimer<'a> {
    /// Starts timing a route.
    pub fn new(sink: &'a dyn RpcMetricsSink, route: &'static str) -> Self {
        Self {
            sink,
            route,
            start: Instant::now(),
        }
    }
}

impl Drop for RequestTimer<'_> {
    fn drop(&mut self) {
        self.sink
            .observe_request_duration(self.route, self.start.elapsed().as_secs_f64());
    }
}
