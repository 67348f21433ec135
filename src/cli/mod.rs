//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{AdjustCommand, ClearCommand, RunCommand, ShiftCommand, StatusCommand, TransformCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Multi-step image registration driven by elastix
#[derive(Debug, Parser, Clone)]
#[command(name = "regpipe")]
#[command(version)]
#[command(about = "Multi-step image registration driven by elastix", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to registration configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Configure the working directory and run the registration steps
    Run(RunCommand),

    /// Show the steps of a working directory and their state
    Status(StatusCommand),

    /// Apply a step's transform to an image, region or structure set
    Transform(TransformCommand),

    /// Remove one step or every step from a working directory
    Clear(ClearCommand),

    /// Copy a parameter file with some values replaced
    Adjust(AdjustCommand),

    /// Shift the translation of a transform file
    Shift(ShiftCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
