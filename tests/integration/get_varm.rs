use super::{close_group, create_group, init_logging, open_group, FORMATS};
use ndarray::{s, Array2};
use ndarray_pnetcdf::{Error, ImapFault, NcType, Options, Requests, Selection};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn data() -> Array2<f32> {
    let mut rng = StdRng::seed_from_u64(0);
    Array2::from_shape_fn((6, 4), |_| rng.gen_range(0..10) as f32)
}

/// Rows 0, 2, 4 and columns 0, 2, delivered transposed.
fn transposing() -> Selection {
    Selection::new()
        .start([0, 0])
        .count([3, 2])
        .stride([2, 2])
        .imap([1, 3])
}

#[test]
fn mapped_reads_transpose() {
    init_logging();
    let data = data();
    let dataref = data.slice(s![..;2, ..;2]).t().to_owned().into_dyn();

    for &format in &FORMATS {
        let (store, mut ranks) = create_group(1, format);
        let ds = &mut ranks[0];
        ds.def_dim("x", 6).unwrap();
        ds.def_dim("y", 4).unwrap();
        ds.def_var("data1", NcType::Float, &["x", "y"]).unwrap();
        ds.enddef().unwrap();
        ds.variable("data1").unwrap().put(Selection::all(), &data).unwrap();
        close_group(ranks);

        let mut ds = open_group(&store, 1, Options::new().read_only()).remove(0);
        ds.end_indep().unwrap();
        ds.enddef().unwrap();
        let got = ds.variable("data1").unwrap().get::<f32, _>(transposing()).unwrap();
        assert_eq!(got.shape(), &[2, 3]);
        assert_eq!(got, dataref);

        ds.begin_indep().unwrap();
        let mut out = vec![0f32; 6];
        ds.variable("data1").unwrap().get_into(transposing(), &mut out).unwrap();
        assert_eq!(out, dataref.iter().copied().collect::<Vec<_>>());
        ds.close().unwrap();
    }
}

#[test]
fn mapped_nonblocking_read() {
    init_logging();
    let data = data();
    let (_, mut ranks) = create_group(1, FORMATS[0]);
    let ds = &mut ranks[0];
    ds.def_dim("x", 6).unwrap();
    ds.def_dim("y", 4).unwrap();
    ds.def_var("data1", NcType::Float, &["x", "y"]).unwrap();
    ds.enddef().unwrap();
    ds.variable("data1").unwrap().put(Selection::all(), &data).unwrap();

    let id = ds.variable("data1").unwrap().iget::<f32, _>(transposing()).unwrap();
    assert!(matches!(ds.take::<f32>(id), Err(Error::PendingRequests(1))));
    ds.wait_all(Requests::All).unwrap();
    assert_eq!(ds.take::<f32>(id).unwrap(), data.slice(s![..;2, ..;2]).t().to_owned().into_dyn());
}

#[test]
fn mapped_write() {
    init_logging();
    let (_, mut ranks) = create_group(1, FORMATS[1]);
    let ds = &mut ranks[0];
    ds.def_dim("x", 6).unwrap();
    ds.def_dim("y", 4).unwrap();
    ds.def_var("data1", NcType::Float, &["x", "y"]).unwrap();
    ds.enddef().unwrap();

    // The caller's buffer is laid out column-major.
    let columns = Array2::from_shape_vec((2, 3), vec![1., 2., 3., 4., 5., 6.]).unwrap();
    let mut v = ds.variable("data1").unwrap();
    v.put(transposing(), &columns).unwrap();
    let got = v.get::<f32, _>(s![..;2, ..;2]).unwrap();
    assert_eq!(got, columns.t().to_owned().into_dyn());
    assert_eq!(v.get::<f32, _>(s![1, ..]).unwrap().sum(), 0.);
}

#[test]
fn unsupported_maps() {
    init_logging();
    let (_, mut ranks) = create_group(1, FORMATS[2]);
    let ds = &mut ranks[0];
    ds.def_dim("x", 6).unwrap();
    ds.def_dim("y", 4).unwrap();
    ds.def_var("data1", NcType::Float, &["x", "y"]).unwrap();
    ds.enddef().unwrap();
    let mut v = ds.variable("data1").unwrap();

    assert!(matches!(
        v.get::<f32, _>(Selection::new().imap([1, 6])),
        Err(Error::UnsupportedImap(ImapFault::WholeVariable))
    ));

    // Gaps in the caller's buffer cannot be an array, but a slice is fine.
    let gappy = Selection::new().start([0, 0]).count([3, 2]).imap([1, 4]);
    assert!(matches!(
        v.get::<f32, _>(gappy.clone()),
        Err(Error::UnsupportedImap(ImapFault::NotDense))
    ));
    let mut out = vec![-1f32; 7];
    v.get_into(gappy, &mut out).unwrap();
    assert_eq!(out, vec![0., 0., 0., -1., 0., 0., 0.]);
}
