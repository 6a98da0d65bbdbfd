//! Dimension and variable declarations of a dataset.

use crate::dataset::Format;
use crate::element::NcType;
use std::fmt;

/// Declared length of the unlimited (record) dimension.
pub const UNLIMITED: usize = 0;

/// Index of a dimension within its dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DimId(pub(crate) usize);

impl DimId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Index of a variable within its dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarId(pub(crate) usize);

impl VarId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "var#{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dimension {
    name: String,
    len: usize,
}

impl Dimension {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared length; [`UNLIMITED`] for the record dimension.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_unlimited(&self) -> bool {
        self.len == UNLIMITED
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableInfo {
    name: String,
    nc_type: NcType,
    dims: Vec<DimId>,
}

impl VariableInfo {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nc_type(&self) -> NcType {
        self.nc_type
    }

    pub fn dims(&self) -> &[DimId] {
        &self.dims
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }
}

/// Everything declared in define mode. Handed to the store at `enddef` and
/// returned by it on `open`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Schema {
    format: Format,
    dims: Vec<Dimension>,
    vars: Vec<VariableInfo>,
}

impl Schema {
    pub fn new(format: Format) -> Schema {
        Schema {
            format,
            dims: Vec::new(),
            vars: Vec::new(),
        }
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn dims(&self) -> &[Dimension] {
        &self.dims
    }

    pub fn vars(&self) -> &[VariableInfo] {
        &self.vars
    }

    pub fn dim(&self, id: DimId) -> Option<&Dimension> {
        self.dims.get(id.0)
    }

    pub fn var(&self, id: VarId) -> Option<&VariableInfo> {
        self.vars.get(id.0)
    }

    pub fn dim_id(&self, name: &str) -> Option<DimId> {
        self.dims.iter().position(|d| d.name == name).map(DimId)
    }

    pub fn var_id(&self, name: &str) -> Option<VarId> {
        self.vars.iter().position(|v| v.name == name).map(VarId)
    }

    /// The unlimited dimension, if one is declared.
    pub fn unlimited(&self) -> Option<DimId> {
        self.dims.iter().position(Dimension::is_unlimited).map(DimId)
    }

    /// Returns `true` iff the variable's first axis is the unlimited
    /// dimension.
    pub fn is_record(&self, id: VarId) -> bool {
        self.var(id)
            .and_then(|v| v.dims.first())
            .and_then(|&d| self.dim(d))
            .map_or(false, Dimension::is_unlimited)
    }

    /// Current shape of a variable, with the unlimited axis at `num_records`.
    pub fn shape(&self, id: VarId, num_records: usize) -> Option<Vec<usize>> {
        let var = self.var(id)?;
        var.dims
            .iter()
            .map(|&d| {
                self.dim(d)
                    .map(|dim| if dim.is_unlimited() { num_records } else { dim.len })
            })
            .collect()
    }

    /// Number of elements in one record of a record variable, or in the
    /// whole of a fixed-size variable.
    pub fn record_len(&self, id: VarId) -> Option<usize> {
        let shape = self.shape(id, 1)?;
        Some(shape.iter().product())
    }

    pub(crate) fn push_dim(&mut self, name: &str, len: usize) -> DimId {
        self.dims.push(Dimension {
            name: name.to_owned(),
            len,
        });
        DimId(self.dims.len() - 1)
    }

    pub(crate) fn push_var(&mut self, name: &str, nc_type: NcType, dims: Vec<DimId>) -> VarId {
        self.vars.push(VariableInfo {
            name: name.to_owned(),
            nc_type,
            dims,
        });
        VarId(self.vars.len() - 1)
    }

    /// Returns `true` iff `self` keeps every declaration of `earlier`, in
    /// order, and only adds to it.
    pub fn extends(&self, earlier: &Schema) -> bool {
        self.format == earlier.format
            && self.dims.starts_with(&earlier.dims)
            && self.vars.starts_with(&earlier.vars)
    }
}
