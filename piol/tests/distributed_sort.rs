#![allow(clippy::cast_possible_truncation)]

use piol::decomposition::block_decomposition;
use piol::file::{ReadSegy, WriteSegy};
use piol::minmax::get_coord_min_max;
use piol::segy::NumberFormat;
use piol::sort::{SortType, check_order, sort};
use piol::{Context, Key, PiolConfig, Rules, TraceMetadata};
use piol_comm::{LocalCommunicator, run_group};
use piol_error::PiolResult;
use piol_io::InMemoryFile;
use piol_metrics::SORT_ROUNDS;
use rstest::rstest;

const NUM_TRACES: u64 = 400;
const NUM_SAMPLES: u16 = 8;

fn inline_of(i: u64) -> i64 {
    1600 + (i / 3000) as i64
}

fn crossline_of(i: u64) -> i64 {
    1600 + (i % 3000) as i64
}

/// Write the survey with trace `i` stored at file position `NUM_TRACES - 1 - i`.
fn write_reversed_survey(ctx: &Context, file: InMemoryFile) -> PiolResult<()> {
    let mut out = WriteSegy::create(ctx, file, NUM_SAMPLES, 2000, NumberFormat::IbmFloat32)
        .with_text(b"C 1 reversed inline/crossline survey")?;
    out.set_num_traces(NUM_TRACES);

    let block = block_decomposition(ctx, NUM_TRACES)?;
    let rules = Rules::with_keys([Key::Inline, Key::Crossline, Key::CmpX, Key::CmpY])?;
    let mut store = TraceMetadata::new(rules, block.size as usize);
    let mut samples = Vec::new();
    for (row, position) in block.range().enumerate() {
        let i = NUM_TRACES - 1 - position;
        store.set_integer(row, Key::Inline, inline_of(i))?;
        store.set_integer(row, Key::Crossline, crossline_of(i))?;
        store.set_float(row, Key::CmpX, 1000.25 + i as f64)?;
        store.set_float(row, Key::CmpY, 5000.0 - i as f64 / 2.0)?;
        samples.extend((0..NUM_SAMPLES).map(|s| position as f32 + f32::from(s) / 8.0));
    }
    out.write_metadata(block.offset, store.num_traces(), &store, 0)?;
    out.write_traces(block.offset, store.num_traces(), &samples)?;
    out.finish()
}

#[rstest]
#[case(PiolConfig::default())]
#[case(PiolConfig::default().with_sort_region(7).unwrap())]
#[case(PiolConfig::default().with_max_traces_per_io(16).unwrap().with_coalescing_window(0))]
fn line_sort_of_reversed_survey(#[case] config: PiolConfig) {
    let file = InMemoryFile::new();
    let results = run_group(4, |comm| {
        let ctx = Context::new(comm, config.clone());
        write_reversed_survey(&ctx, file.clone())?;

        let input = ReadSegy::open(&ctx, file.clone())?;
        let block = input.decompose()?;
        assert_eq!((block.offset, block.size), (100 * ctx.rank() as u64, 100));

        let rules = SortType::Line.rules()?;
        let mut store = TraceMetadata::new(rules.clone(), block.size as usize);
        input.read_metadata(block.offset, store.num_traces(), &mut store, 0)?;
        let sorted_before = check_order(&ctx, &store, block.offset, SortType::Line)?;

        let permutation = sort(&ctx, &store, block.offset, SortType::Line)?;
        let mut sorted = TraceMetadata::new(rules, permutation.len());
        input.read_metadata_at(&permutation.indices, &mut sorted, 0)?;
        let sorted_after = check_order(&ctx, &sorted, permutation.offset, SortType::Line)?;

        let mut samples = vec![0.0; permutation.len() * usize::from(NUM_SAMPLES)];
        input.read_traces_at(&permutation.indices, &mut samples)?;
        Ok((sorted_before, sorted_after, permutation, sorted, samples))
    })
    .unwrap();

    for (rank, (before, after, permutation, sorted, samples)) in results.into_iter().enumerate() {
        assert!(!before);
        assert!(after);
        assert_eq!(permutation.offset, 100 * rank as u64);
        let expected = (0..100).map(|q| 399 - 100 * rank as u64 - q).collect::<Vec<_>>();
        assert_eq!(permutation.indices, expected);
        for (row, &position) in permutation.indices.iter().enumerate() {
            let i = NUM_TRACES - 1 - position;
            assert_eq!(sorted.get_integer(row, Key::Crossline).unwrap(), crossline_of(i));
            assert_eq!(sorted.get_index(row, Key::GlobalTraceNumber).unwrap(), position);
            assert_eq!(samples[row * usize::from(NUM_SAMPLES)], position as f32);
        }
    }
}

#[test]
fn coordinate_extremes_of_survey() {
    let file = InMemoryFile::new();
    let results = run_group(3, |comm| {
        let ctx = Context::new(comm, PiolConfig::default());
        write_reversed_survey(&ctx, file.clone())?;

        let input = ReadSegy::open(&ctx, file.clone())?;
        let block = input.decompose()?;
        let rules = Rules::with_keys([Key::CmpX, Key::CmpY])?;
        let mut store = TraceMetadata::new(rules, block.size as usize);
        input.read_metadata(block.offset, store.num_traces(), &mut store, 0)?;
        get_coord_min_max(&ctx, block.offset, &store, Key::CmpX, Key::CmpY)
    })
    .unwrap();

    for result in results {
        let [x, y] = result.unwrap();
        assert_eq!(x.min.value, 1000.25);
        assert_eq!(x.min.trace_index, 399);
        assert_eq!(x.max.value, 1399.25);
        assert_eq!(x.max.trace_index, 0);
        assert_eq!(y.min.value, 4800.5);
        assert_eq!(y.min.trace_index, 0);
        assert_eq!(y.max.trace_index, 399);
    }
}

/// Every trace of a rank shares one inline; the global trace number is the file order.
fn tied_store(ctx: &Context, total: u64) -> PiolResult<(u64, TraceMetadata)> {
    let block = block_decomposition(ctx, total)?;
    let mut store = TraceMetadata::new(SortType::Line.rules()?, block.size as usize);
    for (row, i) in block.range().enumerate() {
        store.set_integer(row, Key::Inline, (i % 3) as i64)?;
        store.set_integer(row, Key::Crossline, 7)?;
        store.set_index(row, Key::GlobalTraceNumber, i)?;
    }
    Ok((block.offset, store))
}

#[test]
fn equal_keys_keep_file_order() {
    let results = run_group(3, |comm| {
        let ctx = Context::new(comm, PiolConfig::default());
        let (offset, store) = tied_store(&ctx, 10)?;
        sort(&ctx, &store, offset, SortType::Line)
    })
    .unwrap();

    let order = results
        .into_iter()
        .flat_map(|p| p.indices)
        .collect::<Vec<_>>();
    assert_eq!(order, vec![0, 3, 6, 9, 1, 4, 7, 2, 5, 8]);
}

#[test]
fn sorting_sorted_data_is_identity() {
    let results = run_group(4, |comm| {
        let ctx = Context::new(comm, PiolConfig::default());
        let (offset, store) = tied_store(&ctx, 13)?;
        let first = sort(&ctx, &store, offset, SortType::Line)?;

        let mut sorted = TraceMetadata::new(store.rules().clone(), first.len());
        for (row, &index) in first.indices.iter().enumerate() {
            // the original row may live on another rank
            sorted.set_integer(row, Key::Inline, (index % 3) as i64)?;
            sorted.set_integer(row, Key::Crossline, 7)?;
            sorted.set_index(row, Key::GlobalTraceNumber, index)?;
        }

        let rounds_before = ctx.metrics().count(SORT_ROUNDS);
        let second = sort(&ctx, &sorted, first.offset, SortType::Line)?;
        let rounds = ctx.metrics().count(SORT_ROUNDS) - rounds_before;
        Ok((first, second, rounds))
    })
    .unwrap();

    for (first, second, rounds) in results {
        assert_eq!(first, second);
        assert_eq!(rounds, 1);
    }
}

#[test]
fn single_worker_sort() {
    let ctx = Context::new(LocalCommunicator::single(), PiolConfig::default());
    let (offset, store) = tied_store(&ctx, 5).unwrap();
    let permutation = sort(&ctx, &store, offset, SortType::Line).unwrap();
    assert_eq!(permutation.indices, vec![0, 3, 1, 4, 2]);
}
