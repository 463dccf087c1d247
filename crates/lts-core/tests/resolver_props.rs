use lts_core::{ShardLayout, resolve};
use proptest::prelude::*;

fn arb_layout() -> impl Strategy<Value = ShardLayout> {
    prop_oneof![
        Just(1_u64),
        1_u64..10_000,
        Just(100_000_000_u64),
        any::<u64>().prop_filter("non-zero", |s| *s > 0),
    ]
    .prop_map(|size| ShardLayout::new(size).expect("non-zero shard size"))
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(2000))]

    #[test]
    fn clipped_size_stays_inside_shard_and_request(
        layout in arb_layout(),
        offset in any::<u64>(),
        size in any::<u64>(),
    ) {
        let addr = layout.resolve(offset, size);
        let shard_size = layout.shard_size();
        prop_assert!(addr.clipped_size <= size);
        prop_assert!(addr.clipped_size <= shard_size - offset % shard_size);
        prop_assert_eq!(addr.in_file_offset, offset % shard_size);
    }

    #[test]
    fn resolve_is_deterministic(layout in arb_layout(), offset in any::<u64>(), size in any::<u64>()) {
        prop_assert_eq!(layout.resolve(offset, size), layout.resolve(offset, size));
    }

    #[test]
    fn path_names_the_shard_start(offset in 0_u64..1_000_000_000_000, size in 0_u64..1_000) {
        let layout = ShardLayout::new(1000).expect("layout");
        let addr = layout.resolve(offset, size);
        let parts: Vec<&str> = addr.path.split('/').collect();
        prop_assert_eq!(parts.len(), 3);
        prop_assert!(parts[0].len() >= 2);
        prop_assert_eq!(parts[1].len(), 2);
        prop_assert!(parts[2].len() >= 10);

        let start: u64 = parts[2].parse().expect("numeric filename");
        prop_assert_eq!(start, offset - addr.in_file_offset);

        let index = offset / 1000;
        prop_assert_eq!(parts[0].parse::<u64>().expect("numeric"), index / 10_000);
        prop_assert_eq!(parts[1].parse::<u64>().expect("numeric"), (index / 100) % 100);
    }

    #[test]
    fn split_requests_cover_the_range_without_gaps(offset in 0_u64..1_000_000, size in 0_u64..5_000) {
        let layout = ShardLayout::new(1000).expect("layout");
        let (mut cursor, mut remaining) = (offset, size);
        while remaining > 0 {
            let addr = layout.resolve(cursor, remaining);
            prop_assert!(addr.clipped_size > 0);
            cursor += addr.clipped_size;
            remaining -= addr.clipped_size;
        }
        prop_assert_eq!(cursor, offset + size);
    }
}

#[test]
fn default_layout_sample_is_stable() {
    let first = resolve(230_000_000_010, 220);
    for _ in 0..10 {
        assert_eq!(resolve(230_000_000_010, 220), first);
    }
    assert_eq!(first.path, "00/23/230000000000");
    assert_eq!(first.in_file_offset, 10);
    assert_eq!(first.clipped_size, 220);
}
