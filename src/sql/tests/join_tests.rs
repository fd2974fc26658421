use crate::common::utility::{
    create_keyed_table_definition, create_random_rows, create_table_definition, int_rows,
};
use crate::common::{Error, Result};
use crate::config::Settings;
use crate::sql::execution::{
    BlockNestedLoopJoin, BoxedOperator, GraceHashJoin, KeyHasher, Operator,
};
use crate::sql::planner::JoinCondition;
use crate::sql::tests::utility::{
    assert_pages_full, drain_pages, reference_join, rows_of, sorted, Recorder, TestContext,
};
use crate::storage::tuple::Row;
use crate::types::field::Field;
use crate::types::{DataType, Table};
use itertools::Itertools;

// Keyed tables are 8 bytes per tuple: two input tuples per page, and one
// joined tuple per output page.
const PAGE_SIZE: usize = 16;
const PAYLOAD_LEN: u16 = 4;

#[derive(Clone, Copy, Debug)]
enum Algorithm {
    NestedLoop,
    Hash,
}

const ALGORITHMS: [Algorithm; 2] = [Algorithm::NestedLoop, Algorithm::Hash];

/// Either join, so each scenario runs against both.
enum Join {
    NestedLoop(BlockNestedLoopJoin),
    Hash(GraceHashJoin),
}

impl Join {
    fn new(
        algorithm: Algorithm,
        left: BoxedOperator,
        right: BoxedOperator,
        conditions: Vec<JoinCondition>,
        buffers: usize,
        settings: &Settings,
    ) -> Result<Self> {
        Ok(match algorithm {
            Algorithm::NestedLoop => Join::NestedLoop(BlockNestedLoopJoin::new(
                left, right, conditions, buffers, settings,
            )?),
            Algorithm::Hash => {
                Join::Hash(GraceHashJoin::new(left, right, conditions, buffers, settings)?)
            }
        })
    }

    fn operator(&mut self) -> &mut dyn Operator {
        match self {
            Join::NestedLoop(join) => join,
            Join::Hash(join) => join,
        }
    }

    fn peak_pages(&self) -> usize {
        match self {
            Join::NestedLoop(join) => join.peak_pages(),
            Join::Hash(join) => join.peak_pages(),
        }
    }

    fn spill_files(&self) -> usize {
        match self {
            Join::NestedLoop(join) => join.spill_files(),
            Join::Hash(join) => join.spill_files(),
        }
    }
}

fn on_id() -> Vec<JoinCondition> {
    vec![JoinCondition::new("l.id", "r.id")]
}

fn keyed_row(id: Field, payload: &str) -> Row {
    Row::from(vec![id, Field::from(payload)])
}

fn strings(rows: &[Row]) -> Vec<String> {
    rows.iter().map(|r| r.to_string()).collect()
}

/// Pulls pages until `next` fails, returning the error.
fn next_until_error(operator: &mut dyn Operator) -> Error {
    loop {
        match operator.next() {
            Ok(Some(_)) => continue,
            Ok(None) => panic!("stream ended without an error"),
            Err(e) => return e,
        }
    }
}

/// Joins `left` and `right` on their ids, drains the result and closes the
/// join, checking the page shape, budget and cleanup along the way.
fn run_keyed_join(
    ctx: &TestContext,
    algorithm: Algorithm,
    left: &[Row],
    right: &[Row],
    conditions: Vec<JoinCondition>,
    buffers: usize,
) -> Vec<Row> {
    let schema_l = create_keyed_table_definition("l", PAYLOAD_LEN);
    let schema_r = create_keyed_table_definition("r", PAYLOAD_LEN);
    let mut join = Join::new(
        algorithm,
        ctx.values(&schema_l, left),
        ctx.values(&schema_r, right),
        conditions,
        buffers,
        ctx.settings(),
    )
    .unwrap();

    let pages = drain_pages(join.operator());
    assert_pages_full(&pages);
    assert!(
        join.peak_pages() <= buffers,
        "{algorithm:?} held {} pages with a budget of {buffers}",
        join.peak_pages()
    );
    join.operator().close().unwrap();
    assert_eq!(join.spill_files(), 0);
    assert_eq!(ctx.spill_files(), 0);
    rows_of(pages)
}

// =============================== Basic joins ================================

#[test]
fn test_join_small_relations() {
    let ctx = TestContext::new(8);
    for algorithm in ALGORITHMS {
        let mut join = Join::new(
            algorithm,
            ctx.values(&create_table_definition(1, "l"), &int_rows([1, 2, 2, 3])),
            ctx.values(&create_table_definition(1, "r"), &int_rows([2, 2, 3, 4])),
            vec![JoinCondition::new("l0", "r0")],
            4,
            ctx.settings(),
        )
        .unwrap();

        let rows = rows_of(drain_pages(join.operator()));
        join.operator().close().unwrap();
        assert_eq!(
            sorted(rows).iter().map(|r| r.to_string()).collect_vec(),
            vec!["2, 2", "2, 2", "2, 2", "2, 2", "3, 3"],
            "{algorithm:?}"
        );
        assert_eq!(ctx.spill_files(), 0);
    }
}

#[test]
fn test_join_matches_reference() {
    let schema_l = create_keyed_table_definition("l", PAYLOAD_LEN);
    let schema_r = create_keyed_table_definition("r", PAYLOAD_LEN);
    let left = create_random_rows(&schema_l, 40, 8, Some(7));
    let right = create_random_rows(&schema_r, 30, 8, Some(11));
    let expected = sorted(reference_join(&left, &right, &[(0, 0)]));
    assert!(!expected.is_empty());

    let ctx = TestContext::new(PAGE_SIZE);
    for algorithm in ALGORITHMS {
        for buffers in [3, 4, 5, 7] {
            let rows = run_keyed_join(&ctx, algorithm, &left, &right, on_id(), buffers);
            assert_eq!(sorted(rows), expected, "{algorithm:?} with {buffers} buffers");
        }
    }
}

#[test]
fn test_join_large_pages() {
    // Everything fits in a single page, so nothing has to be re-read.
    let schema_l = create_keyed_table_definition("l", PAYLOAD_LEN);
    let schema_r = create_keyed_table_definition("r", PAYLOAD_LEN);
    let left = create_random_rows(&schema_l, 50, 20, Some(3));
    let right = create_random_rows(&schema_r, 50, 20, Some(5));
    let expected = sorted(reference_join(&left, &right, &[(0, 0)]));

    let ctx = TestContext::new(4096);
    for algorithm in ALGORITHMS {
        let rows = run_keyed_join(&ctx, algorithm, &left, &right, on_id(), 3);
        assert_eq!(sorted(rows), expected, "{algorithm:?}");
    }
}

#[test]
fn test_join_multiple_conditions() {
    let left = vec![
        keyed_row(1.into(), "a"),
        keyed_row(1.into(), "b"),
        keyed_row(2.into(), "a"),
        keyed_row(3.into(), "c"),
    ];
    let right = vec![
        keyed_row(1.into(), "a"),
        keyed_row(1.into(), "a"),
        keyed_row(2.into(), "b"),
        keyed_row(3.into(), "c"),
    ];
    let conditions = vec![
        JoinCondition::new("l.id", "r.id"),
        JoinCondition::new("l.payload", "r.payload"),
    ];
    let expected = sorted(reference_join(&left, &right, &[(0, 0), (1, 1)]));
    assert_eq!(expected.len(), 3);

    let ctx = TestContext::new(PAGE_SIZE);
    for algorithm in ALGORITHMS {
        let rows = run_keyed_join(&ctx, algorithm, &left, &right, conditions.clone(), 3);
        assert_eq!(sorted(rows), expected, "{algorithm:?}");
    }
}

#[test]
fn test_join_null_keys_never_match() {
    let left = vec![
        keyed_row(Field::Null, "a"),
        keyed_row(1.into(), "b"),
        keyed_row(Field::Null, "c"),
    ];
    let right = vec![keyed_row(Field::Null, "x"), keyed_row(1.into(), "y")];

    let ctx = TestContext::new(PAGE_SIZE);
    for algorithm in ALGORITHMS {
        let rows = run_keyed_join(&ctx, algorithm, &left, &right, on_id(), 3);
        assert_eq!(
            rows.iter().map(|r| r.to_string()).collect_vec(),
            vec!["1, 'b', 1, 'y'"],
            "{algorithm:?}"
        );
    }
}

#[test]
fn test_join_empty_inputs() {
    let some = vec![keyed_row(1.into(), "a"), keyed_row(2.into(), "b")];
    let ctx = TestContext::new(PAGE_SIZE);
    for algorithm in ALGORITHMS {
        for (left, right) in [(vec![], some.clone()), (some.clone(), vec![]), (vec![], vec![])] {
            let rows = run_keyed_join(&ctx, algorithm, &left, &right, on_id(), 3);
            assert!(rows.is_empty(), "{algorithm:?}");
        }
    }
}

#[test]
fn test_join_no_matches() {
    let left = (0..6).map(|i| keyed_row(i.into(), "l")).collect_vec();
    let right = (10..16).map(|i| keyed_row(i.into(), "r")).collect_vec();
    let ctx = TestContext::new(PAGE_SIZE);
    for algorithm in ALGORITHMS {
        assert!(run_keyed_join(&ctx, algorithm, &left, &right, on_id(), 4).is_empty());
    }
}

#[test]
fn test_join_wide_text_columns() {
    // Each side is over 40000 bytes wide, so the joined tuple size does not
    // fit in 16 bits.
    let wide = |name: &str| {
        Table::builder()
            .name(name)
            .column(&format!("{name}.id"), DataType::Int, false, None, None)
            .column(&format!("{name}.t"), DataType::Text, false, None, Some(40000))
            .build()
    };
    let left = vec![keyed_row(1.into(), "a"), keyed_row(2.into(), "b")];
    let right = vec![keyed_row(2.into(), "c"), keyed_row(3.into(), "d")];

    let ctx = TestContext::new(4096);
    for algorithm in ALGORITHMS {
        let mut join = Join::new(
            algorithm,
            ctx.values(&wide("l"), &left),
            ctx.values(&wide("r"), &right),
            on_id(),
            3,
            ctx.settings(),
        )
        .unwrap();
        assert_eq!(join.operator().schema().size(), 80008);

        let pages = drain_pages(join.operator());
        assert!(pages.iter().all(|page| page.capacity() == 1));
        join.operator().close().unwrap();
        assert_eq!(
            strings(&rows_of(pages)),
            vec!["2, 'b', 2, 'c'"],
            "{algorithm:?}"
        );
        assert_eq!(ctx.spill_files(), 0);
    }
}

// ============================ Protocol behavior =============================

#[test]
fn test_join_next_before_open() {
    let ctx = TestContext::new(PAGE_SIZE);
    for algorithm in ALGORITHMS {
        let mut join = Join::new(
            algorithm,
            ctx.values(&create_keyed_table_definition("l", PAYLOAD_LEN), &[]),
            ctx.values(&create_keyed_table_definition("r", PAYLOAD_LEN), &[]),
            on_id(),
            3,
            ctx.settings(),
        )
        .unwrap();
        assert!(matches!(join.operator().next(), Err(Error::InvalidInput(_))));
    }
}

#[test]
fn test_join_close_before_exhaustion() {
    let schema_l = create_keyed_table_definition("l", PAYLOAD_LEN);
    let schema_r = create_keyed_table_definition("r", PAYLOAD_LEN);
    let left = create_random_rows(&schema_l, 20, 3, Some(1));
    let right = create_random_rows(&schema_r, 20, 3, Some(2));

    let ctx = TestContext::new(PAGE_SIZE);
    for algorithm in ALGORITHMS {
        let mut join = Join::new(
            algorithm,
            ctx.values(&schema_l, &left),
            ctx.values(&schema_r, &right),
            on_id(),
            3,
            ctx.settings(),
        )
        .unwrap();
        join.operator().open().unwrap();
        assert!(join.operator().next().unwrap().is_some());
        assert!(ctx.spill_files() > 0, "{algorithm:?} should have spilled");

        join.operator().close().unwrap();
        assert_eq!(join.spill_files(), 0);
        assert_eq!(ctx.spill_files(), 0);

        // closing twice is harmless, and a closed join is not open
        join.operator().close().unwrap();
        assert!(matches!(join.operator().next(), Err(Error::InvalidInput(_))));
    }
}

#[test]
fn test_join_reopen() {
    let schema_l = create_keyed_table_definition("l", PAYLOAD_LEN);
    let schema_r = create_keyed_table_definition("r", PAYLOAD_LEN);
    let left = create_random_rows(&schema_l, 15, 4, Some(21));
    let right = create_random_rows(&schema_r, 15, 4, Some(22));

    let ctx = TestContext::new(PAGE_SIZE);
    for algorithm in ALGORITHMS {
        let mut join = Join::new(
            algorithm,
            ctx.values(&schema_l, &left),
            ctx.values(&schema_r, &right),
            on_id(),
            4,
            ctx.settings(),
        )
        .unwrap();
        let first = rows_of(drain_pages(join.operator()));
        join.operator().close().unwrap();
        let second = rows_of(drain_pages(join.operator()));
        join.operator().close().unwrap();

        assert_eq!(first, second, "{algorithm:?}");
        assert_eq!(ctx.spill_files(), 0);
    }
}

#[test]
fn test_join_children_opened_and_closed() {
    let ctx = TestContext::new(PAGE_SIZE);
    let schema_l = create_keyed_table_definition("l", PAYLOAD_LEN);
    let schema_r = create_keyed_table_definition("r", PAYLOAD_LEN);
    let rows = vec![keyed_row(1.into(), "a"), keyed_row(2.into(), "b")];
    for algorithm in ALGORITHMS {
        let (left, left_calls) = Recorder::new(ctx.values(&schema_l, &rows));
        let (right, right_calls) = Recorder::new(ctx.values(&schema_r, &rows));
        let mut join = Join::new(
            algorithm,
            Box::new(left),
            Box::new(right),
            on_id(),
            3,
            ctx.settings(),
        )
        .unwrap();

        assert_eq!(rows_of(drain_pages(join.operator())).len(), 2);
        join.operator().close().unwrap();
        for calls in [left_calls, right_calls] {
            assert_eq!(calls.opens.get(), 1, "{algorithm:?}");
            assert!(calls.closes.get() >= 1, "{algorithm:?}");
        }
    }
}

#[test]
fn test_join_child_open_failure() {
    let ctx = TestContext::new(PAGE_SIZE);
    let schema_l = create_keyed_table_definition("l", PAYLOAD_LEN);
    let schema_r = create_keyed_table_definition("r", PAYLOAD_LEN);
    let rows = vec![keyed_row(1.into(), "a"), keyed_row(2.into(), "b")];
    for algorithm in ALGORITHMS {
        for failing_left in [true, false] {
            let (left, right): (BoxedOperator, BoxedOperator) = if failing_left {
                (
                    Box::new(Recorder::failing(ctx.values(&schema_l, &rows))),
                    ctx.values(&schema_r, &rows),
                )
            } else {
                (
                    ctx.values(&schema_l, &rows),
                    Box::new(Recorder::failing(ctx.values(&schema_r, &rows))),
                )
            };
            let mut join =
                Join::new(algorithm, left, right, on_id(), 3, ctx.settings()).unwrap();

            assert!(
                matches!(join.operator().open(), Err(Error::SetupFailure(_))),
                "{algorithm:?}"
            );
            join.operator().close().unwrap();
            assert_eq!(ctx.spill_files(), 0);
        }
    }
}

#[test]
fn test_join_invalid_setup() {
    let ctx = TestContext::new(PAGE_SIZE);
    let schema_l = create_keyed_table_definition("l", PAYLOAD_LEN);
    let schema_r = create_keyed_table_definition("r", PAYLOAD_LEN);
    for algorithm in ALGORITHMS {
        let too_small = Join::new(
            algorithm,
            ctx.values(&schema_l, &[]),
            ctx.values(&schema_r, &[]),
            on_id(),
            2,
            ctx.settings(),
        );
        assert!(matches!(too_small, Err(Error::InvalidInput(_))));

        for conditions in [vec![], vec![JoinCondition::new("l.id", "r.missing")]] {
            let mut join = Join::new(
                algorithm,
                ctx.values(&schema_l, &[]),
                ctx.values(&schema_r, &[]),
                conditions,
                3,
                ctx.settings(),
            )
            .unwrap();
            assert!(matches!(join.operator().open(), Err(Error::InvalidInput(_))));
        }
    }
}

#[test]
fn test_join_outer_fails_mid_stream() {
    // The left input breaks on its third page, after the inner side has been
    // spilled and some output produced.
    let schema_l = create_keyed_table_definition("l", PAYLOAD_LEN);
    let schema_r = create_keyed_table_definition("r", PAYLOAD_LEN);
    let rows = (0..10i32).map(|i| keyed_row((i % 3).into(), "x")).collect_vec();

    let ctx = TestContext::new(PAGE_SIZE);
    let left = Recorder::failing_at(ctx.values(&schema_l, &rows), 3);
    let mut join = BlockNestedLoopJoin::new(
        Box::new(left),
        ctx.values(&schema_r, &rows),
        on_id(),
        3,
        ctx.settings(),
    )
    .unwrap();
    join.open().unwrap();

    assert!(matches!(next_until_error(&mut join), Error::TempFileRead(_)));
    assert!(ctx.spill_files() > 0);
    join.close().unwrap();
    assert_eq!(join.spill_files(), 0);
    assert_eq!(ctx.spill_files(), 0);
}

#[test]
fn test_join_fails_while_spilling_input() {
    // Nested-loop: the inner side breaks while it is being materialized.
    // Hash: the left side breaks while it is being partitioned, after the
    // right side has been materialized.
    let schema_l = create_keyed_table_definition("l", PAYLOAD_LEN);
    let schema_r = create_keyed_table_definition("r", PAYLOAD_LEN);
    let rows = (0..10i32).map(|i| keyed_row((i % 3).into(), "x")).collect_vec();

    let ctx = TestContext::new(PAGE_SIZE);
    let mut nested_loop = BlockNestedLoopJoin::new(
        ctx.values(&schema_l, &rows),
        Box::new(Recorder::failing_at(ctx.values(&schema_r, &rows), 3)),
        on_id(),
        3,
        ctx.settings(),
    )
    .unwrap();
    assert!(matches!(nested_loop.open(), Err(Error::TempFileRead(_))));
    assert_eq!(ctx.spill_files(), 1);
    nested_loop.close().unwrap();
    assert_eq!(ctx.spill_files(), 0);

    let mut hash = GraceHashJoin::new(
        Box::new(Recorder::failing_at(ctx.values(&schema_l, &rows), 3)),
        ctx.values(&schema_r, &rows),
        on_id(),
        3,
        ctx.settings(),
    )
    .unwrap();
    assert!(matches!(hash.open(), Err(Error::TempFileRead(_))));
    assert!(ctx.spill_files() > 0);
    hash.close().unwrap();
    assert_eq!(hash.spill_files(), 0);
    assert_eq!(ctx.spill_files(), 0);
}

#[test]
fn test_hash_join_fails_while_probing() {
    // A bucket file is truncated after partitioning, so the failure only
    // shows up once the join starts reading buckets back.
    let schema_l = create_keyed_table_definition("l", PAYLOAD_LEN);
    let schema_r = create_keyed_table_definition("r", PAYLOAD_LEN);
    let rows = (0..10i32).map(|i| keyed_row((i % 2).into(), "x")).collect_vec();

    let ctx = TestContext::new(PAGE_SIZE);
    let mut join = GraceHashJoin::new(
        ctx.values(&schema_l, &rows),
        ctx.values(&schema_r, &rows),
        on_id(),
        3,
        ctx.settings(),
    )
    .unwrap();
    join.open().unwrap();
    let spilled = ctx.spill_files();
    assert!(spilled > 0);
    for entry in std::fs::read_dir(&ctx.settings().spill_dir).unwrap() {
        let file = std::fs::OpenOptions::new()
            .write(true)
            .open(entry.unwrap().path())
            .unwrap();
        file.set_len(3).unwrap();
    }

    assert!(matches!(next_until_error(&mut join), Error::TempFileRead(_)));
    assert_eq!(ctx.spill_files(), spilled);
    join.close().unwrap();
    assert_eq!(ctx.spill_files(), 0);
}

// ============================ Grace hash specifics ===========================

#[derive(Clone, Debug)]
struct ConstantHasher;

impl KeyHasher for ConstantHasher {
    fn hash(&self, _key: &Field) -> u64 {
        7
    }
}

#[test]
fn test_hash_join_skewed_bucket() {
    // With 3 buffers a left bucket is built one page at a time, so the five
    // equal keys (three pages) are built in three chunks.
    let left = (0..5).map(|i| keyed_row(4.into(), &i.to_string())).collect_vec();
    let right = (0..3).map(|i| keyed_row(4.into(), &i.to_string())).collect_vec();
    let ctx = TestContext::new(PAGE_SIZE);
    let mut join = GraceHashJoin::new(
        ctx.values(&create_keyed_table_definition("l", PAYLOAD_LEN), &left),
        ctx.values(&create_keyed_table_definition("r", PAYLOAD_LEN), &right),
        on_id(),
        3,
        ctx.settings(),
    )
    .unwrap();
    assert_eq!(join.bucket_count(), 2);

    let rows = rows_of(drain_pages(&mut join));
    assert_eq!(join.chunks_built(), 3);
    assert!(join.peak_pages() <= 3);
    join.close().unwrap();

    assert_eq!(sorted(rows), sorted(reference_join(&left, &right, &[(0, 0)])));
    assert_eq!(ctx.spill_files(), 0);
}

#[test]
fn test_hash_join_with_colliding_hashers() {
    // Every key lands in one bucket and one chain; the join must still only
    // emit pairs whose values are equal.
    let schema_l = create_keyed_table_definition("l", PAYLOAD_LEN);
    let schema_r = create_keyed_table_definition("r", PAYLOAD_LEN);
    let left = create_random_rows(&schema_l, 24, 6, Some(31));
    let right = create_random_rows(&schema_r, 24, 6, Some(32));
    let expected = sorted(reference_join(&left, &right, &[(0, 0)]));

    let ctx = TestContext::new(PAGE_SIZE);
    let mut join = GraceHashJoin::new(
        ctx.values(&schema_l, &left),
        ctx.values(&schema_r, &right),
        on_id(),
        4,
        ctx.settings(),
    )
    .unwrap()
    .with_partition_hasher(Box::new(ConstantHasher))
    .with_probe_hasher(Box::new(ConstantHasher));

    let pages = drain_pages(&mut join);
    assert_pages_full(&pages);
    assert!(join.peak_pages() <= 4);
    join.close().unwrap();
    assert_eq!(sorted(rows_of(pages)), expected);
}

#[test]
fn test_hash_join_chunks_per_bucket() {
    // Keys 0..4 spread over 3 buckets by value; every left bucket fits one
    // chunk of 3 pages.
    let left = (0..4).map(|i| keyed_row(i.into(), "l")).collect_vec();
    let right = (0..4).map(|i| keyed_row(i.into(), "r")).collect_vec();
    let ctx = TestContext::new(PAGE_SIZE);
    let mut join = GraceHashJoin::new(
        ctx.values(&create_keyed_table_definition("l", PAYLOAD_LEN), &left),
        ctx.values(&create_keyed_table_definition("r", PAYLOAD_LEN), &right),
        on_id(),
        4,
        ctx.settings(),
    )
    .unwrap();

    let rows = rows_of(drain_pages(&mut join));
    assert_eq!(join.chunks_built(), 3);
    join.close().unwrap();
    assert_eq!(rows.len(), 4);
}
