#[allow(dead_code)]
pub mod dunning_testkit;
