//! Capacity expansion and hourly dispatch optimisation for a micro-grid.
//!
//! A year of hourly demand, renewable capacity factors, hydro inflow and market prices is turned
//! into a single linear program, which chooses how much wind, solar, biomass and hydro capacity to
//! build within a capex budget and how to operate every asset in each hour.
#![warn(missing_docs)]
pub mod cli;
pub mod finance;
pub mod id;
pub mod input;
pub mod log;
pub mod model;
pub mod network;
pub mod optimisation;
pub mod output;
pub mod results;
pub mod settings;
pub mod simulation;
pub mod units;

#[cfg(test)]
mod fixture;
