use ndarray::prelude::*;
use ndarray_pnetcdf::{
    strerror, Dataset, Error, Format, Group, MemoryStore, NcType, Options, Selection, UNLIMITED,
};

const SIZE: usize = 4;
const NUM_REQS: usize = 10;

/// Each rank posts buffered writes of a subsampled block to ten variables and
/// commits them with one collective `wait_all`.
fn write_example(store: &MemoryStore) -> Result<(), Error> {
    let mut ranks = Vec::new();
    for rank in 0..SIZE {
        let options = Options::new().format(Format::Data64).group(Group::new(rank, SIZE));
        let mut ds = Dataset::create(store.clone(), options)?;
        ds.def_dim("time", UNLIMITED)?;
        ds.def_dim("y", 10)?;
        ds.def_dim("x", SIZE * 10)?;
        for i in 0..NUM_REQS {
            ds.def_var(&format!("data{}", i), NcType::Int, &["time", "y", "x"])?;
        }
        ds.enddef()?;
        ranks.push(ds);
    }

    for (rank, ds) in ranks.iter_mut().enumerate() {
        let block = Array3::from_elem((1, 3, 5), rank as i32 + 1);
        ds.attach_buff(NUM_REQS * block.len() * 4)?;
        let mut ids = Vec::new();
        for i in 0..NUM_REQS {
            let selection = Selection::new()
                .start([3, 0, 10 * rank])
                .count([1, 3, 5])
                .stride([1, 2, 2]);
            ids.push(ds.variable(&format!("data{}", i))?.bput(selection, &block)?);
        }
        println!(
            "rank {}: {} of {} buffer bytes in use",
            rank,
            ds.get_buff_usage()?,
            ds.get_buff_size()?
        );
        for (id, code) in ds.wait_all(ids)? {
            if !code.is_ok() {
                println!("rank {}: request {} failed: {}", rank, id, strerror(code));
            }
        }
        ds.detach_buff()?;
    }

    for ds in ranks {
        ds.close().map_err(|err| err.into_parts().1)?;
    }
    Ok(())
}

fn read_example(store: &MemoryStore) -> Result<(), Error> {
    let mut ds = Dataset::open(store.clone(), Options::new().read_only())?;
    ds.enddef()?;
    let record = ds.variable("data0")?.get::<i32, _>(s![3, 0..6, ..])?;
    println!("data0[3, 0..6, ..] =\n{}", record);
    Ok(())
}

fn main() {
    let store = MemoryStore::new();
    write_example(&store).expect("failure writing with buffered requests");
    read_example(&store).expect("failure reading back");
}
