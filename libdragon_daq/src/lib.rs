//! # dragon_daq
//!
//! dragon_daq is the readout front end for the Dragon FEB prototype boards,
//! written in Rust. It connects to every board listed in a connection table,
//! streams fixed-size event frames over TCP, pedestal-corrects the sampled
//! waveforms against a rolling per-cell history, flags corrupted frames, and
//! reports the achieved read throughput per board.
//!
//! ## Installation
//!
//! The only method of install is from source. If you have not used Rust
//! before you will need the Rust tool chain; see the
//! [Rust docs](https://www.rust-lang.org/tools/install) for installation
//! instructions. Then, from the top level of the repository:
//!
//! `cargo install --path ./dragon_daq_cli`
//!
//! The binary lands in your cargo install location (typically
//! `~/.cargo/bin/`) and can be removed with `cargo uninstall dragon_daq_cli`.
//!
//! ## Configuration
//!
//! Configuration is a YAML file; `dragon_daq_cli new -p config.yaml` writes
//! a template. The format is as follows:
//!
//! ```yml
//! connection_table: febs.txt
//! output_prefix: run42_
//! sample_depth: 30
//! protocol_version: 5
//! n_events: 1000
//! prescale_factor: 1
//! adc_threshold: 0
//! input_freq_hz: 3000
//! save_raw: false
//! close_inspect: false
//! corruption_policy: threshold
//! drain: first_target
//! warmup_events: 100
//! event_delay_us: 0
//! ```
//!
//! The connection table is a plain text file with one `host port` pair per
//! line; `#` starts a comment. The trailing numeric component of each host
//! address becomes that board's suffix in output file names.
//!
//! `sample_depth` is the read depth of the board's ring memory and fixes the
//! frame size together with `protocol_version` (versions above 4 carry the
//! long 64-byte header). `n_events` sets the per-board byte target;
//! `drain` picks whether the run ends when the first board reaches it or
//! when all boards do. `corruption_policy` selects the per-frame test:
//! `threshold` scans the body against `adc_threshold`, `residual` tests the
//! mean pedestal residual for statistical significance.
//!
//! ## Output
//!
//! A run leaves behind, under `output_prefix`:
//!
//! - one raw frame file per board (`...RD{depth}_FEB{idx}_IP{suffix}.dat`),
//!   populated per `prescale_factor` when `save_raw` is on, blank otherwise
//! - a CSV of corrected samples (`...RD{depth}.csv`), kept only when at
//!   least one frame of the run was flagged corrupted
//! - an append-only throughput summary (`...RD{depth}.dat`), one row per run
//! - with `close_inspect`, a timestamped timing file with the inter-event
//!   deltas of every board (`...timing/RD{depth}infreq..._MMDD_HHMMSS.dat`)
pub mod acquisition;
pub mod config;
pub mod connection;
pub mod connection_table;
pub mod constants;
pub mod corruption;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod pedestal;
pub mod process;
pub mod report;
pub mod sink;
pub mod stats;
pub mod worker_status;
