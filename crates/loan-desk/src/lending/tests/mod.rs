mod catalog;
mod common;
mod payments;
mod sweeps;
