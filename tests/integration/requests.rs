use super::{init_logging, Recording};
use ndarray::{arr1, Array1};
use ndarray_pnetcdf::{
    Dataset, Error, ErrorCode, MemoryStore, NcType, Options, RequestId, RequestState, Requests, Selection,
};

fn dataset() -> Dataset<Recording<MemoryStore>> {
    let mut ds = Dataset::create(Recording::new(MemoryStore::new()), Options::new()).unwrap();
    ds.def_dim("x", 4).unwrap();
    for name in &["a", "b", "c"] {
        ds.def_var(name, NcType::Int, &["x"]).unwrap();
    }
    ds.enddef().unwrap();
    ds
}

fn bput(ds: &mut Dataset<Recording<MemoryStore>>, start: usize, values: &[i32]) -> RequestId {
    let values = Array1::from(values.to_vec());
    let selection = Selection::new().start([start]).count([values.len()]);
    ds.variable("a").unwrap().bput(selection, &values).unwrap()
}

fn read(ds: &mut Dataset<Recording<MemoryStore>>, name: &str) -> Vec<i32> {
    let got = ds.variable(name).unwrap().get::<i32, _>(Selection::all()).unwrap();
    got.iter().copied().collect()
}

#[test]
fn overlapping_writes_apply_in_post_order() {
    init_logging();
    let mut ds = dataset();
    let first = ds.variable("a").unwrap().iput(Selection::all(), arr1(&[1, 1, 1, 1])).unwrap();
    let second = ds
        .variable("a")
        .unwrap()
        .iput(Selection::new().start([1]).count([2]), arr1(&[2, 2]))
        .unwrap();

    // Statuses follow the order given; the writes still follow post order.
    let statuses = ds.wait_all(vec![second, RequestId::NULL, first]).unwrap();
    assert_eq!(
        statuses,
        vec![
            (second, ErrorCode::NOERR),
            (RequestId::NULL, ErrorCode::NOERR),
            (first, ErrorCode::NOERR),
        ]
    );
    assert_eq!(read(&mut ds, "a"), vec![1, 2, 2, 1]);
}

#[test]
fn overlapping_buffered_writes_apply_in_post_order() {
    init_logging();
    for &independent in &[false, true] {
        let mut ds = dataset();
        ds.attach_buff(32).unwrap();
        if independent {
            ds.begin_indep().unwrap();
        }
        let a = bput(&mut ds, 0, &[1, 1, 1, 1]);
        let b = bput(&mut ds, 1, &[2, 2, 2]);
        let c = bput(&mut ds, 0, &[3]);
        assert_eq!(ds.get_buff_usage().unwrap(), 32);

        // Committing the middle request alone frees space behind a live one.
        assert_eq!(ds.wait_all(b).unwrap(), vec![(b, ErrorCode::NOERR)]);
        assert_eq!(ds.get_buff_usage().unwrap(), 20);
        let d = bput(&mut ds, 2, &[4, 4]);
        assert_eq!(ds.get_buff_usage().unwrap(), 28);

        let statuses = ds.wait_all(Requests::All).unwrap();
        assert_eq!(
            statuses,
            vec![(a, ErrorCode::NOERR), (c, ErrorCode::NOERR), (d, ErrorCode::NOERR)]
        );
        assert_eq!(ds.get_buff_usage().unwrap(), 0);
        if independent {
            assert_eq!(ds.store().batches, 0);
            ds.end_indep().unwrap();
        } else {
            assert_eq!(ds.store().batch_sizes, vec![1, 3]);
        }
        assert_eq!(read(&mut ds, "a"), vec![3, 1, 4, 4]);
    }
}

#[test]
fn collective_commit_is_one_batch() {
    init_logging();
    let mut ds = dataset();
    ds.attach_buff(16).unwrap();
    for name in &["a", "b"] {
        ds.variable(name).unwrap().iput(Selection::all(), arr1(&[3, 4, 5, 6])).unwrap();
    }
    ds.variable("c").unwrap().bput(Selection::all(), &arr1(&[7, 8, 9, 10])).unwrap();
    ds.wait_all(Requests::All).unwrap();
    assert_eq!(ds.store().batch_sizes, vec![3]);
    assert!(ds.store().singles.is_empty());

    ds.begin_indep().unwrap();
    for name in &["a", "b"] {
        ds.variable(name).unwrap().iput(Selection::all(), arr1(&[0, 0, 0, 0])).unwrap();
    }
    ds.wait_all(Requests::All).unwrap();
    assert_eq!(ds.store().batches, 1);
    assert_eq!(ds.store().singles, vec![false, false]);
    ds.end_indep().unwrap();
    assert_eq!(read(&mut ds, "c"), vec![7, 8, 9, 10]);
}

#[test]
fn one_failure_leaves_the_rest() {
    init_logging();
    let store = Recording::new(MemoryStore::new()).fail("b");
    let mut ds = Dataset::create(store, Options::new()).unwrap();
    ds.def_dim("x", 4).unwrap();
    for name in &["a", "b", "c"] {
        ds.def_var(name, NcType::Int, &["x"]).unwrap();
    }
    ds.enddef().unwrap();
    ds.attach_buff(16).unwrap();

    let ids: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|name| ds.variable(name).unwrap().iput(Selection::all(), arr1(&[1, 2, 3, 4])).unwrap())
        .collect();
    let staged = ds.variable("b").unwrap().bput(Selection::all(), &arr1(&[5, 6, 7, 8])).unwrap();
    assert_eq!(ds.get_buff_usage().unwrap(), 16);

    let statuses = ds.wait_all(Requests::All).unwrap();
    let codes: Vec<_> = statuses.iter().map(|&(_, code)| code).collect();
    assert_eq!(
        codes,
        vec![ErrorCode::NOERR, ErrorCode::EWRITE, ErrorCode::NOERR, ErrorCode::EWRITE]
    );
    assert_eq!(statuses[3].0, staged);
    assert_eq!(ds.pending(), 0);
    assert_eq!(ds.get_buff_usage().unwrap(), 0);
    assert!(matches!(ds.status(ids[1]), Err(Error::UnknownRequest(_))));
    assert_eq!(read(&mut ds, "a"), vec![1, 2, 3, 4]);
    assert_eq!(read(&mut ds, "c"), vec![1, 2, 3, 4]);

    // Blocking transfers report the failure directly.
    let err = ds.variable("b").unwrap().get::<i32, _>(Selection::all()).unwrap_err();
    assert_eq!(err.code(), ErrorCode::EWRITE);
    assert!(matches!(err, Error::Collaborator(_)));
}

#[test]
fn close_refuses_pending_requests() {
    init_logging();
    let mut ds = dataset();
    ds.attach_buff(16).unwrap();
    let id = ds.variable("a").unwrap().bput(Selection::all(), &arr1(&[1, 2, 3, 4])).unwrap();

    let mut ds = match ds.close() {
        Ok(_) => panic!("closed with a pending request"),
        Err(err) => {
            assert!(matches!(err.error(), Error::PendingRequests(1)));
            err.into_dataset()
        }
    };
    assert!(matches!(ds.redef(), Err(Error::PendingRequests(1))));
    assert_eq!(ds.cancel(Requests::All).unwrap(), vec![id]);
    assert_eq!(ds.get_buff_usage().unwrap(), 0);
    assert!(matches!(ds.status(id), Err(Error::UnknownRequest(_))));
    let store = ds.close().unwrap();
    assert_eq!(store.batches, 0);

    // Cancelled writes never reached the file.
    let mut ds = Dataset::open(store.inner, Options::new().read_only()).unwrap();
    ds.enddef().unwrap();
    let got: Array1<i32> = ds
        .variable("a")
        .unwrap()
        .get::<i32, _>(Selection::all())
        .unwrap()
        .into_dimensionality()
        .unwrap();
    assert_eq!(got, arr1(&[0, 0, 0, 0]));
}

#[test]
fn selections_by_direction() {
    init_logging();
    let mut ds = dataset();
    ds.variable("a").unwrap().put(Selection::all(), &arr1(&[4, 3, 2, 1])).unwrap();
    let r = ds.variable("a").unwrap().iget::<i32, _>(Selection::new().start([2])).unwrap();
    let w = ds.variable("b").unwrap().iput(Selection::all(), arr1(&[9, 9, 9, 9])).unwrap();
    assert!(matches!(ds.attach_buff(8), Err(Error::PendingRequests(2))));

    assert_eq!(ds.wait_all(Requests::AllWrites).unwrap(), vec![(w, ErrorCode::NOERR)]);
    assert_eq!(ds.status(r).unwrap(), RequestState::Posted);
    assert_eq!(ds.wait_all(Requests::AllReads).unwrap(), vec![(r, ErrorCode::NOERR)]);
    assert_eq!(ds.status(r).unwrap(), RequestState::Completed(ErrorCode::NOERR));
    // A completed read cannot be cancelled or committed again.
    assert!(matches!(ds.cancel(r), Err(Error::RequestNotPending(_))));
    assert!(matches!(ds.wait_all(r), Err(Error::UnknownRequest(_))));
    assert_eq!(ds.take::<i32>(r).unwrap().as_slice(), Some(&[2, 1][..]));
    assert!(matches!(ds.wait_all(w), Err(Error::UnknownRequest(_))));
}
