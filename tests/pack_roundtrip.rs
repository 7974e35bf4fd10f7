mod util;
use util::*;

use adjoint_tape::backend::{AdjointValue, DenseField, DenseSpace};
use adjoint_tape::comm::NoComm;
use adjoint_tape::optimize::{
    ConstantValue, Control, PackLayout, decide_partition, pack_controls, unpack_controls,
};
use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serial_test::serial;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

fn seeded_rng(parts: &[usize]) -> SmallRng {
    let mut h = DefaultHasher::new();
    for p in parts {
        p.hash(&mut h);
    }
    SmallRng::seed_from_u64(h.finish())
}

fn zeroed_like(controls: &[Control<DenseField>]) -> Vec<Control<DenseField>> {
    controls
        .iter()
        .map(|c| match c {
            Control::Field(v) => Control::Field(DenseField::zeros(v.name(), v.space())),
            Control::Constant { name, value } => Control::constant(
                name.clone(),
                value.from_flat_like(&vec![0.0; value.flat_len()]).unwrap(),
            ),
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_single_rank_roundtrip(
        field_len in 1usize..24,
        const_len in 1usize..6,
    ) {
        let mut rng = seeded_rng(&[field_len, const_len]);
        let space = DenseSpace::new("M", field_len);
        let field_vals: Vec<f64> = (0..field_len).map(|_| rng.gen_range(-5.0..5.0)).collect();
        let const_vals: Vec<f64> = (0..const_len).map(|_| rng.gen_range(-5.0..5.0)).collect();

        let controls = vec![
            Control::Field(DenseField::from_values("m", &space, field_vals.clone()).unwrap()),
            Control::constant("nu", ConstantValue::Vector(const_vals.clone())),
            Control::constant("kappa", ConstantValue::Scalar(rng.gen_range(-5.0..5.0))),
        ];
        let layout = PackLayout::build(&controls, &NoComm).unwrap();
        prop_assert_eq!(layout.local_len(), field_len + const_len + 1);
        prop_assert_eq!(layout.global_len(), (field_len + const_len + 1) as u64);

        let packed = pack_controls(&controls, &layout, &NoComm).unwrap();
        let mut restored = zeroed_like(&controls);
        unpack_controls(&packed, &mut restored, &layout, &NoComm).unwrap();
        prop_assert_eq!(&restored, &controls);
    }

    #[test]
    fn prop_layout_entries_are_contiguous(
        lens in proptest::collection::vec(1usize..9, 1..6),
    ) {
        let controls: Vec<Control<DenseField>> = lens
            .iter()
            .enumerate()
            .map(|(i, &len)| {
                Control::constant(format!("c{i}"), ConstantValue::Vector(vec![1.0; len]))
            })
            .collect();
        let layout = PackLayout::build(&controls, &NoComm).unwrap();

        let mut cursor = 0usize;
        for (entry, &len) in layout.entries().iter().zip(&lens) {
            prop_assert_eq!(entry.local_offset, cursor);
            prop_assert_eq!(entry.len, len);
            prop_assert_eq!(entry.global_len, len);
            cursor += len;
        }
        prop_assert_eq!(layout.local_len(), cursor);
    }

    #[test]
    fn prop_partition_shares_cover_the_range(
        global in 0usize..200,
        size in 1usize..9,
    ) {
        let mut cursor = 0usize;
        for rank in 0..size {
            let (start, len) = decide_partition(global, rank, size);
            prop_assert_eq!(start, cursor);
            cursor += len;
            // front-loaded: no rank owns more than one extra element
            prop_assert!(len <= global / size + 1);
        }
        prop_assert_eq!(cursor, global);
    }
}

#[test]
#[serial]
fn two_rank_roundtrip_reassembles_fields_and_constants() {
    let (c0, c1) = rank_pair();

    let run = |comm: adjoint_tape::comm::RayonComm, local_field: Vec<f64>| {
        let space = DenseSpace::new("M", local_field.len());
        let controls = vec![
            Control::Field(DenseField::from_values("m", &space, local_field).unwrap()),
            Control::constant("nu", ConstantValue::Vector(vec![7.0, 8.0, 9.0])),
        ];
        let layout = PackLayout::build(&controls, &comm).unwrap();
        let packed = pack_controls(&controls, &layout, &comm).unwrap();
        let mut restored = zeroed_like(&controls);
        unpack_controls(&packed, &mut restored, &layout, &comm).unwrap();
        (layout, restored, controls)
    };

    let t1 = std::thread::spawn(move || run(c1, vec![4.0, 5.0]));
    let (layout0, restored0, controls0) = run(c0, vec![1.0, 2.0, 3.0]);
    let (layout1, restored1, controls1) = t1.join().unwrap();

    // rank 0 owns its field part plus two of the three constant entries
    assert_eq!(layout0.local_len(), 5);
    assert_eq!(layout0.owner_start(), 0);
    assert_eq!(layout1.local_len(), 3);
    assert_eq!(layout1.owner_start(), 5);
    assert_eq!(layout0.global_len(), 8);
    assert_eq!(layout1.global_len(), 8);

    // every control comes back bit-identical on both ranks
    assert_eq!(restored0, controls0);
    assert_eq!(restored1, controls1);
}
