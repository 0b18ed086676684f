use super::*;

mod batch_runs;
mod repairs;
