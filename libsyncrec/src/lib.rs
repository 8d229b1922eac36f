//! # syncrec
//!
//! syncrec is a sync record builder for multi-rate airborne instrument data, written in
//! Rust. It takes time tagged samples from many sensors, each reporting at its own
//! nominal rate, and aligns them into one record per second of wall-clock time. Every
//! stream gets a fixed set of slots in each record, one per expected sample, so
//! consumers can read a whole second of data at fixed offsets.
//!
//! ## Building & Install
//!
//! To build and install the CLI use `cargo install --path ./syncrec_cli` from the top
//! level syncrec repository. HDF5 output is optional; build with `--features hdf5` to
//! enable it. HDF5 must then be installed, typically through a package manager
//! (homebrew, apt, etc). If the Rust libraries cannot detect it, set `HDF5_DIR` in
//! `.cargo/config.toml`:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//! ```
//!
//! ## Configuration
//!
//! The YAML format of a configuration file is as follows:
//!
//! ```yml
//! sample_path: /path/to/samples.csv
//! output_path: /path/to/records.dat
//! stats_path: null
//! hdf_path: null
//! out_of_slot_max: 4
//! non_integral_bound: slot_period
//! streams:
//! - id: 100
//!   rate: 10.0
//!   variables:
//!   - name: TTX
//!     units: degC
//!     length: 1
//!     long_name: Total temperature
//! ```
//!
//! - `streams` is the catalog. Rows of the record follow its order. A stream's `rate` may
//! be fractional (e.g. 12.5 Hz), in which case the last slot is left empty in every
//! `skip_mod`-th record.
//! - `out_of_slot_max` is the number of consecutive early or late samples tolerated
//! before a stream's slot grid is resynchronized.
//! - `non_integral_bound` is either `slot_period` or `epoch_overflow`, and selects the
//! upper bound of the time offset of non-integral rate streams.
//! - If `stats_path` is null the statistics are written next to the output file.
//!
//! ### Sample File Format
//!
//! One sample per line, comma separated: `time_usec,sample_id,v0,v1,...`. The time is in
//! microseconds since the Unix epoch. Blank lines and lines starting with `#` are
//! ignored.
//!
//! ## Output
//!
//! ### Record Layout
//!
//! A record is a flat array of f64. Each stream has one row:
//!
//! ```text
//! [toffset][var0 slot0..slotN][var1 slot0..slotN]...
//! ```
//!
//! where a variable of length L takes L consecutive values per slot. `toffset` is the
//! offset in microseconds of the stream's first slot from the start of the second. NaN
//! marks absent values, and a NaN `toffset` means the stream had no sample in that
//! second. The time tag of a record is the middle of its second.
//!
//! ### Record File Format
//!
//! A little endian binary stream of items `[time_tag: i64][id: u32][length: u32][payload]`.
//! The first item is the header (id 1) holding the layout as YAML text. Every following
//! item is a record (id 2) holding `length` f64 values.
//!
//! ### HDF5 Data Format
//!
//! ```text
//! records.h5
//! records - min_record, max_record, min_time_tag, max_time_tag, record_length, version, header
//! |---- record_#(dset) - time_tag, epoch
//! streams
//! |---- stream_#(group) - rate, offset, n_slots, dt_usec, skip_mod, variables, units
//! ```
pub mod alignment;
pub mod config;
pub mod constants;
pub mod error;
pub mod header;
#[cfg(feature = "hdf5")]
pub mod hdf_writer;
pub mod layout;
pub mod process;
pub mod reader;
pub mod record;
pub mod record_file;
pub mod sample;
pub mod sample_file;
pub mod sink;
pub mod source;
pub mod statistics;
pub mod sync_builder;
pub mod variable;
pub mod worker_status;
