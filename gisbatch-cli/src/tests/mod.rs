//! Shared test harness modules for the gisbatch CLI.

use super::*;

mod helpers;
mod unit;
