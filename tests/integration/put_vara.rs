use super::{close_group, create_group, init_logging, open_group, random_i32, FORMATS};
use ndarray::{s, Array3, Ix3};
use ndarray_pnetcdf::{Error, ErrorCode, NcType, Options, Selection, UNLIMITED};

const SIZE: usize = 4;
const ZDIM: usize = SIZE * 10;

fn block_of(rank: usize) -> Selection {
    Selection::new().start([3, 0, 10 * rank]).count([1, 5, 10])
}

#[test]
fn collective_then_independent_subarrays() {
    init_logging();
    let datam = random_i32(&[1, 5, 10], 0).into_dimensionality::<Ix3>().unwrap();
    let data = Array3::<i32>::zeros((9, 10, ZDIM));
    let mut everyone = data.clone();
    let mut first_two = data.clone();
    for rank in 0..SIZE {
        everyone
            .slice_mut(s![3..4, ..5, rank * 10..(rank + 1) * 10])
            .assign(&datam);
        if rank < 2 {
            first_two
                .slice_mut(s![3..4, ..5, rank * 10..(rank + 1) * 10])
                .assign(&datam);
        }
    }

    for &format in &FORMATS {
        let (store, mut ranks) = create_group(SIZE, format);
        for ds in &mut ranks {
            ds.def_dim("x", 9).unwrap();
            ds.def_dim("xu", UNLIMITED).unwrap();
            ds.def_dim("y", 10).unwrap();
            ds.def_dim("z", ZDIM).unwrap();
            ds.def_var("data1u", NcType::Int, &["xu", "y", "z"]).unwrap();
            ds.def_var("data2u", NcType::Int, &["xu", "y", "z"]).unwrap();
            ds.enddef().unwrap();
        }
        for ds in &mut ranks {
            ds.variable("data1u").unwrap().put(Selection::all(), &data).unwrap();
            ds.variable("data2u").unwrap().put(Selection::all(), &data).unwrap();
        }
        close_group(ranks);

        let mut ranks = open_group(&store, SIZE, Options::new());
        for ds in &mut ranks {
            ds.enddef().unwrap();
        }
        for (rank, ds) in ranks.iter_mut().enumerate() {
            ds.variable("data1u").unwrap().put(block_of(rank), &datam).unwrap();
        }
        for (rank, ds) in ranks.iter_mut().enumerate() {
            ds.begin_indep().unwrap();
            if rank < 2 {
                ds.variable("data2u").unwrap().put(block_of(rank), &datam).unwrap();
            }
            ds.end_indep().unwrap();
        }
        close_group(ranks);

        let mut ds = open_group(&store, 1, Options::new().read_only()).remove(0);
        ds.enddef().unwrap();
        let got = ds.variable("data1u").unwrap().get::<i32, _>(Selection::all()).unwrap();
        assert_eq!(got, everyone.clone().into_dyn());
        let got = ds.variable("data2u").unwrap().get::<i32, _>(Selection::all()).unwrap();
        assert_eq!(got, first_two.clone().into_dyn());
    }
}

#[test]
fn out_of_bounds_writes_are_rejected() {
    init_logging();
    let (_, mut ranks) = create_group(1, FORMATS[0]);
    let ds = &mut ranks[0];
    ds.def_dim("xu", UNLIMITED).unwrap();
    ds.def_dim("y", 10).unwrap();
    ds.def_dim("z", 10).unwrap();
    ds.def_var("v", NcType::Int, &["xu", "y", "z"]).unwrap();
    ds.enddef().unwrap();
    let datam = random_i32(&[1, 5, 10], 1);

    let mut v = ds.variable("v").unwrap();
    // The record axis grows, the others do not.
    v.put(Selection::new().start([7, 0, 0]).count([1, 5, 10]), &datam).unwrap();
    assert_eq!(v.shape().unwrap(), vec![8, 10, 10]);

    let err = v
        .put(Selection::new().start([0, 6, 0]).count([1, 5, 10]), &datam)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::EEDGE);
    assert!(matches!(err, Error::InvalidRegion { axis: 1, .. }));

    let err = v
        .put(Selection::new().start([0, 11, 0]).count([1, 5, 10]), &datam)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::EINVALCOORDS);

    let err = v
        .put(Selection::new().start([0, 0]).count([5, 10]), &datam)
        .unwrap_err();
    assert!(matches!(err, Error::RankMismatch { expected: 3, found: 2 }));

    let err = v
        .put(Selection::new().start([0, 0, 0]).count([1, 5, 10]).stride([1, 0, 1]), &datam)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ESTRIDE);

    // Record starts the variable cannot grow to are refused.
    for start in [usize::MAX, usize::MAX / 4] {
        let err = v
            .put(Selection::new().start([start, 0, 0]).count([1, 5, 10]), &datam)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::EEDGE);
        assert!(matches!(err, Error::InvalidRegion { axis: 0, .. }));
    }
    assert_eq!(v.shape().unwrap(), vec![8, 10, 10]);
}
