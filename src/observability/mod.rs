// Observability: metric recording for validation outcomes.

pub mod metrics;
