//! Whole-monitor scenarios: the engine, the transport and every service together.
