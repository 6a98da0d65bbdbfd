use super::{close_group, create_group, init_logging, open_group, random_i32, FORMATS};
use ndarray::{s, Array3, Ix3};
use ndarray_pnetcdf::{strerrno, Error, NcType, Options, Requests, Selection, UNLIMITED};

const NUM_REQS: usize = 10;
const SIZE: usize = 2;
const ZDIM: usize = SIZE * 10;

fn name(i: usize) -> String {
    format!("data{}", i)
}

/// Every other column of the rank's ten, and rows 0, 2 and 4 of record 3.
fn subsampled(rank: usize) -> Selection {
    Selection::new()
        .start([3, 0, 10 * rank])
        .count([1, 3, 5])
        .stride([1, 2, 2])
}

/// Block `i` of ten that tile one variable without overlapping.
fn offset_block(i: usize) -> Selection {
    Selection::new()
        .start([i % 9, i / 9, 2 * (i % 3)])
        .count([1, 3, 5])
        .stride([1, 2, 2])
}

fn block() -> Array3<i32> {
    random_i32(&[1, 3, 5], 0).into_dimensionality::<Ix3>().unwrap()
}

#[test]
fn commit_by_id_then_all_writes() {
    init_logging();
    let datam = block();
    let data = Array3::<i32>::zeros((9, 10, ZDIM));
    let mut expected = data.clone();
    for rank in 0..SIZE {
        expected
            .slice_mut(s![3..4, 0..6;2, rank * 10..(rank + 1) * 10;2])
            .assign(&datam);
    }
    let buff_size = NUM_REQS * datam.len() * 4;

    for &format in &FORMATS {
        let (store, mut ranks) = create_group(SIZE, format);
        for ds in &mut ranks {
            ds.def_dim("x", 9).unwrap();
            ds.def_dim("xu", UNLIMITED).unwrap();
            ds.def_dim("y", 10).unwrap();
            ds.def_dim("z", ZDIM).unwrap();
            for i in 0..NUM_REQS * 2 {
                ds.def_var(&name(i), NcType::Int, &["xu", "y", "z"]).unwrap();
            }
            ds.enddef().unwrap();
            ds.attach_buff(buff_size).unwrap();
            assert_eq!(ds.get_buff_size().unwrap(), buff_size);
        }
        for ds in &mut ranks {
            for i in 0..NUM_REQS * 2 {
                ds.variable(&name(i)).unwrap().put(Selection::all(), &data).unwrap();
            }
        }

        for (rank, ds) in ranks.iter_mut().enumerate() {
            let mut ids = Vec::new();
            for i in 0..NUM_REQS {
                ids.push(ds.variable(&name(i)).unwrap().bput(subsampled(rank), &datam).unwrap());
            }
            assert_eq!(ds.get_buff_usage().unwrap(), buff_size);
            // Harmless in collective mode.
            ds.end_indep().unwrap();
            let statuses = ds.wait_all(ids.clone()).unwrap();
            assert_eq!(statuses.len(), NUM_REQS);
            for ((id, code), posted) in statuses.into_iter().zip(ids) {
                assert_eq!(id, posted);
                assert_eq!(strerrno(code), "NC_NOERR");
            }
            assert_eq!(ds.get_buff_usage().unwrap(), 0);
        }

        for (rank, ds) in ranks.iter_mut().enumerate() {
            for i in NUM_REQS..NUM_REQS * 2 {
                ds.variable(&name(i)).unwrap().bput(subsampled(rank), &datam).unwrap();
            }
            assert_eq!(ds.get_buff_usage().unwrap(), buff_size);
            let statuses = ds.wait_all(Requests::AllWrites).unwrap();
            assert_eq!(statuses.len(), NUM_REQS);
            assert!(statuses.iter().all(|(_, code)| code.is_ok()));
            assert_eq!(ds.get_buff_usage().unwrap(), 0);
            ds.detach_buff().unwrap();
        }
        close_group(ranks);

        let mut ds = open_group(&store, 1, Options::new().read_only()).remove(0);
        assert_eq!(ds.format(), format);
        ds.enddef().unwrap();
        assert_eq!(ds.num_records().unwrap(), 9);
        for i in 0..NUM_REQS * 2 {
            let got = ds.variable(&name(i)).unwrap().get::<i32, _>(Selection::all()).unwrap();
            assert_eq!(got, expected.clone().into_dyn(), "{} in {}", name(i), format);
        }
        ds.close().unwrap();
    }
}

#[test]
fn values_are_copied_when_posted() {
    init_logging();
    let (_, mut ranks) = create_group(1, FORMATS[0]);
    let ds = &mut ranks[0];
    ds.def_dim("y", 10).unwrap();
    ds.def_dim("z", 10).unwrap();
    ds.def_var("v", NcType::Int, &["y", "z"]).unwrap();
    ds.enddef().unwrap();
    ds.attach_buff(60).unwrap();

    let mut datam = block();
    let original = datam.clone();
    let id = ds
        .variable("v")
        .unwrap()
        .bput(s![0..6;2, 0..10;2], datam.slice(s![0, .., ..]))
        .unwrap();
    datam.fill(-1);
    assert!(ds.wait_all(id).unwrap()[0].1.is_ok());

    let got = ds.variable("v").unwrap().get::<i32, _>(s![0..6;2, 0..10;2]).unwrap();
    assert_eq!(got, original.slice(s![0, .., ..]).to_owned().into_dyn());
}

#[test]
fn exhausted_buffer_keeps_its_usage() {
    init_logging();
    let datam = block();
    let (_, mut ranks) = create_group(1, FORMATS[1]);
    let ds = &mut ranks[0];
    ds.def_dim("xu", UNLIMITED).unwrap();
    ds.def_dim("y", 10).unwrap();
    ds.def_dim("z", 10).unwrap();
    ds.def_var("v", NcType::Int, &["xu", "y", "z"]).unwrap();
    ds.enddef().unwrap();
    ds.attach_buff(2 * datam.len() * 4).unwrap();

    let mut v = ds.variable("v").unwrap();
    v.bput(subsampled(0), &datam).unwrap();
    v.bput(subsampled(0).start([4, 0, 0]), &datam).unwrap();
    match v.bput(subsampled(0).start([5, 0, 0]), &datam) {
        Err(Error::BufferExhausted { requested, available }) => {
            assert_eq!(requested, 60);
            assert_eq!(available, 0);
        }
        other => panic!("expected BufferExhausted, got {:?}", other),
    }
    assert_eq!(ds.get_buff_usage().unwrap(), 120);
    assert_eq!(ds.pending(), 2);

    // Detaching with writes in the buffer is refused.
    assert!(matches!(ds.detach_buff(), Err(Error::BufferBusy { usage: 120 })));
    ds.wait_all(Requests::All).unwrap();
    assert_eq!(ds.num_records().unwrap(), 5);
    ds.detach_buff().unwrap();
}

#[test]
fn one_variable_many_offsets() {
    init_logging();
    let blocks: Vec<Array3<i32>> = (0..NUM_REQS)
        .map(|i| {
            random_i32(&[1, 3, 5], 10 + i as u64)
                .into_dimensionality::<Ix3>()
                .unwrap()
        })
        .collect();
    let mut expected = Array3::<i32>::zeros((9, 10, 20));
    for (i, block) in blocks.iter().enumerate() {
        let (x, y, z) = (i % 9, i / 9, 2 * (i % 3));
        expected
            .slice_mut(s![x..x + 1, y..y + 6;2, z..z + 10;2])
            .assign(block);
    }
    let buff_size = NUM_REQS * 15 * 4;

    for &format in &FORMATS {
        for &independent in &[false, true] {
            let (store, mut ranks) = create_group(1, format);
            let ds = &mut ranks[0];
            ds.def_dim("xu", UNLIMITED).unwrap();
            ds.def_dim("y", 10).unwrap();
            ds.def_dim("z", 20).unwrap();
            ds.def_var("v", NcType::Int, &["xu", "y", "z"]).unwrap();
            ds.enddef().unwrap();
            ds.attach_buff(buff_size).unwrap();
            if independent {
                ds.begin_indep().unwrap();
            }

            let ids: Vec<_> = blocks
                .iter()
                .enumerate()
                .map(|(i, block)| ds.variable("v").unwrap().bput(offset_block(i), block).unwrap())
                .collect();
            assert_eq!(ds.get_buff_usage().unwrap(), buff_size);
            assert!(matches!(
                ds.variable("v").unwrap().bput(offset_block(0), &blocks[0]),
                Err(Error::BufferExhausted {
                    requested: 60,
                    available: 0
                })
            ));

            let statuses = ds.wait_all(Requests::All).unwrap();
            assert_eq!(statuses.iter().map(|&(id, _)| id).collect::<Vec<_>>(), ids);
            assert!(statuses.iter().all(|(_, code)| code.is_ok()));
            assert_eq!(ds.get_buff_usage().unwrap(), 0);
            // Harmless in collective mode.
            ds.end_indep().unwrap();
            ds.detach_buff().unwrap();
            close_group(ranks);

            let mut ds = open_group(&store, 1, Options::new().read_only()).remove(0);
            ds.enddef().unwrap();
            assert_eq!(ds.num_records().unwrap(), 9);
            let got = ds.variable("v").unwrap().get::<i32, _>(Selection::all()).unwrap();
            assert_eq!(got, expected.clone().into_dyn(), "{} independent={}", format, independent);
        }
    }
}
