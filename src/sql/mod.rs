pub mod execution;
pub mod planner;
#[cfg(test)]
mod tests;
