use ndarray::prelude::*;
use ndarray_pnetcdf::{Dataset, Error, MemoryStore, NcType, Options, Selection};
use std::error;

fn write_example(store: &MemoryStore) -> Result<Array2<f32>, Error> {
    let data = Array2::from_shape_fn((6, 4), |(i, j)| (i * 4 + j) as f32);
    let mut ds = Dataset::create(store.clone(), Options::new())?;
    ds.def_dim("x", 6)?;
    ds.def_dim("y", 4)?;
    ds.def_var("data1", NcType::Float, &["x", "y"])?;
    ds.enddef()?;
    ds.variable("data1")?.put(s![.., ..], &data)?;
    ds.close().map_err(|err| err.into_parts().1)?;
    Ok(data)
}

/// Reads every other row and column, transposed on the way in by the index
/// map.
fn read_example(store: &MemoryStore) -> Result<Array2<f32>, Box<dyn error::Error>> {
    let mut ds = Dataset::open(store.clone(), Options::new().read_only())?;
    ds.enddef()?;
    let selection = Selection::new()
        .start([0, 0])
        .count([3, 2])
        .stride([2, 2])
        .imap([1, 3]);
    let collective = ds.variable("data1")?.get::<f32, _>(&selection)?;

    ds.begin_indep()?;
    let independent = ds.variable("data1")?.get::<f32, _>(&selection)?;
    assert_eq!(collective, independent);

    Ok(collective.into_dimensionality::<Ix2>()?)
}

fn main() {
    let store = MemoryStore::new();
    let data = write_example(&store).expect("failure writing data1");
    let got = read_example(&store).expect("failure reading data1 through an index map");
    println!("data1 =\n{}\nmapped read =\n{}", data, got);
    assert_eq!(got, data.slice(s![..;2, ..;2]).t());
}
