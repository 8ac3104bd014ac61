//! Cross-screen consolidation of behavioral-phenotype summary statistics.
//!
//! Takes per-screen, per-genotype summary tables (mean / sem / count per
//! metric) and raw metric tables, and derives the two tables the dashboard
//! reads: pooled multi-screen statistics with recomputed 95% confidence
//! intervals, and per-screen-normalized, control-subtracted effect sizes
//! for ranking and heatmaps. Everything is a pure in-memory transform over
//! polars DataFrames; numeric edge cases come back as NaN in the data,
//! structural problems as errors at the table boundary.

pub mod aggregation;
pub mod config;
pub mod helper_functions;
pub mod normalization;
pub mod pooling;
pub mod schema;
pub mod selection;
