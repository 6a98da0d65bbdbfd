//! This crate provides parallel access to netCDF datasets (CDF-1, CDF-2 and
//! CDF-5) as [`ndarray`] arrays, with nonblocking and buffered requests.
//!
//! [`ndarray`]: https://github.com/rust-ndarray/ndarray
//!
//! A [`Dataset`] is opened by each process of a group on top of a [`Store`],
//! the collaborator that owns the file and performs collective I/O.
//! Dimensions and variables are declared in define mode. In data mode,
//! [`Variable`] reads and writes regions given as a [`Selection`]
//! (start/count/stride/imap) or as an [`s!`](ndarray::s) slice:
//!
//! * `get`/`put` transfer before returning.
//! * `iget`/`iput` post a request that [`Dataset::wait_all`] performs.
//! * `bput` copies the values into a buffer attached with
//!   [`Dataset::attach_buff`] and posts a request, so the caller's array is
//!   free as soon as it returns.
//!
//! In collective mode `wait_all` hands all selected requests to the store as
//! one batch; in independent mode (see [`Dataset::begin_indep`]) it performs
//! them one by one. Every request gets its own [`ErrorCode`].
//!
//! [`MemoryStore`] keeps datasets in memory. Its clones share data, which
//! lets several datasets act as the ranks of one group within a process.
//!
//! # Example
//!
//! ```
//! use ndarray::{s, Array3};
//! use ndarray_pnetcdf::{Dataset, Format, MemoryStore, NcType, Options, Requests, UNLIMITED};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//!
//! let mut ds = Dataset::create(MemoryStore::new(), Options::new().format(Format::Data64))?;
//! ds.def_dim("time", UNLIMITED)?;
//! ds.def_dim("y", 10)?;
//! ds.def_dim("x", 20)?;
//! ds.def_var("temp", NcType::Int, &["time", "y", "x"])?;
//! ds.enddef()?;
//!
//! let block = Array3::<i32>::from_elem((1, 3, 5), 7);
//! ds.attach_buff(10 * block.len() * 4)?;
//! let mut ids = Vec::new();
//! for t in 0..10 {
//!     ids.push(ds.variable("temp")?.bput(s![t..t + 1, 0..6;2, 10..20;2], &block)?);
//! }
//! for (_, status) in ds.wait_all(ids)? {
//!     assert!(status.is_ok());
//! }
//! assert_eq!(ds.get_buff_usage()?, 0);
//! ds.detach_buff()?;
//! ds.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Limitations
//!
//! * Variables are read and written in their own type. There is no
//!   conversion between element types.
//!
//! * Attributes, groups, and user-defined types are not supported.
//!
//! * Processes must make collective calls in the same order. This is not
//!   checked.

mod buffer;
mod dataset;
mod element;
mod error;
mod mode;
mod request;
mod schema;
mod slice;
mod store;
mod variable;

pub use crate::buffer::{BufferAccountant, Reservation};
pub use crate::dataset::{AccessMode, Dataset, Format, Group, Hints, Options};
pub use crate::element::{Element, NcType};
pub use crate::error::{strerrno, strerror, CloseError, Error, ErrorCode, Result, StoreError};
pub use crate::mode::{Access, Mode, ModeFault, Phase};
pub use crate::request::{Direction, RequestId, RequestState, Requests};
pub use crate::schema::{DimId, Dimension, Schema, VarId, VariableInfo, UNLIMITED};
pub use crate::slice::{ImapFault, Positions, Region, RegionFault, Selection, SliceDescriptor};
pub use crate::store::{MemoryStore, Store, Transfer};
pub use crate::variable::{Fetched, GetOp, PutOp, Variable};
