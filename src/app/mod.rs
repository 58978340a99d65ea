//! Process bootstrap

pub mod cli;
pub mod startup;

#[cfg(test)]
mod tests;
