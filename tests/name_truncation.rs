mod util;
use util::*;

use adjoint_tape::annotate::assign;
use adjoint_tape::backend::{DenseField, DenseSpace};
use adjoint_tape::tape::{ADJ_NAME_LEN, Adjointer, BlockName};

#[test]
fn short_names_pass_through() {
    let n = BlockName::new("Identity: V");
    assert_eq!(n.as_str(), "Identity: V");
}

#[test]
fn oversized_names_truncate_below_the_limit() {
    let long = "x".repeat(2 * ADJ_NAME_LEN);
    let n = BlockName::new(long);
    assert_eq!(n.as_str().len(), ADJ_NAME_LEN - 1);
}

#[test]
fn truncation_lands_on_a_char_boundary() {
    // two-byte chars cannot divide the odd limit evenly
    let long = "\u{00E9}".repeat(ADJ_NAME_LEN);
    let n = BlockName::new(long);
    assert!(n.as_str().len() < ADJ_NAME_LEN);
    assert!(n.as_str().chars().all(|c| c == '\u{00E9}'));
}

#[test]
fn colliding_labels_keep_distinct_targets() {
    // two sources whose names agree for the first ADJ_NAME_LEN bytes produce
    // identical block labels, but the tape still tells the equations apart
    // by their untruncated target variables
    let stem = "s".repeat(ADJ_NAME_LEN + 1);
    let name_a = format!("{stem}a");
    let name_b = format!("{stem}b");
    assert_eq!(
        BlockName::new(name_a.clone()).as_str(),
        BlockName::new(name_b.clone()).as_str()
    );

    let space = DenseSpace::new("V", 1);
    let src_a = DenseField::from_values(&name_a, &space, vec![1.0]).unwrap();
    let src_b = DenseField::from_values(&name_b, &space, vec![2.0]).unwrap();
    let mut ta = DenseField::zeros("ta", &space);
    let mut tb = DenseField::zeros("tb", &space);

    let mut adj = Adjointer::new();
    assign(&mut adj, &mut ta, &src_a, None).unwrap();
    assign(&mut adj, &mut tb, &src_b, None).unwrap();

    let labeled: Vec<_> = adj
        .equations()
        .iter()
        .filter(|eq| {
            eq.blocks()
                .iter()
                .any(|b| b.name().as_str().starts_with("Identity: "))
        })
        .collect();
    assert_eq!(labeled.len(), 2);
    assert_eq!(
        labeled[0].blocks()[0].name().as_str(),
        labeled[1].blocks()[0].name().as_str()
    );
    assert_ne!(labeled[0].target(), labeled[1].target());
    assert_eq!(labeled[0].target().name(), "ta");
    assert_eq!(labeled[1].target().name(), "tb");
}

#[test]
fn annotated_block_labels_are_bounded() {
    // a field whose name blows past the limit still annotates cleanly
    let huge_name = "m".repeat(ADJ_NAME_LEN + 100);
    let space = DenseSpace::new("V", 2);
    let source = DenseField::from_values(&huge_name, &space, vec![1.0, 2.0]).unwrap();
    let mut target = DenseField::zeros("t", &space);
    let mut adj = Adjointer::new();
    assign(&mut adj, &mut target, &source, None).unwrap();
    for eq in adj.equations() {
        for block in eq.blocks() {
            assert!(block.name().as_str().len() < ADJ_NAME_LEN);
        }
    }
    assert_eq!(target.data(), &[1.0, 2.0]);
}
