mod healthcheck;

pub use healthcheck::HealthCheck;
