use proptest::prelude::*;
use quorum_wait::config::interesting_configs;
use quorum_wait::quorum;
use quorum_wait::{ClusterConfig, WaitError};

proptest! {
    #[test]
    fn quorum_fits_inside_every_valid_cluster(f in 0usize..30, c in 0usize..30) {
        let n = 3 * f + 2 * c + 1;
        prop_assert!(quorum::validate(n, f, c).is_ok());

        let size = quorum::quorum_size(f, c);
        prop_assert_eq!(size, 2 * f + 2 * c + 1);
        prop_assert!(size <= n);
        prop_assert_eq!(size, n - f);
        prop_assert!(quorum::crash_quorum_size(f, c) <= size);

        let config = ClusterConfig::new(n, f, c).unwrap();
        prop_assert_eq!(config.quorum_size(), size);
        prop_assert_eq!(config.max_faulty(), f);
    }

    #[test]
    fn invalid_sizing_is_rejected(n in 0usize..100, f in 0usize..30, c in 0usize..30) {
        prop_assume!(n != 3 * f + 2 * c + 1);
        let is_invalid_config = matches!(quorum::validate(n, f, c), Err(WaitError::InvalidConfig { .. }));
        prop_assert!(is_invalid_config);
        prop_assert!(ClusterConfig::new(n, f, c).is_err());
    }

    #[test]
    fn oversized_faults_are_invalid_not_a_panic(n in any::<usize>(), f in (usize::MAX / 3)..=usize::MAX, c in any::<usize>()) {
        let is_invalid_config = matches!(quorum::validate(n, f, c), Err(WaitError::InvalidConfig { .. }));
        prop_assert!(is_invalid_config);
        prop_assert!(ClusterConfig::new(n, f, c).is_err());
        prop_assert!(quorum::quorum_size(f, c) >= quorum::crash_quorum_size(f, c));
    }

    #[test]
    fn all_members_is_sorted_difference(
        n in 1usize..50,
        excluded in proptest::collection::btree_set(0usize..60, 0..12),
    ) {
        let members = quorum::all_members(n, &excluded);
        prop_assert!(members.iter().all(|id| *id < n && !excluded.contains(id)));
        prop_assert_eq!(members.len(), (0..n).filter(|id| !excluded.contains(id)).count());
        prop_assert!(members.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn primary_rotates_through_all_replicas(view in 0u64..10_000, f in 0usize..5) {
        let n = 3 * f + 1;
        let primary = quorum::primary_for_view(view, n);
        prop_assert!(primary < n);
        prop_assert_eq!(quorum::primary_for_view(view + n as u64, n), primary);
    }
}

#[test]
fn test_documented_sizings() {
    assert!(quorum::validate(4, 1, 1).is_err());
    assert!(quorum::validate(4, 1, 0).is_ok());
    assert_eq!(quorum::quorum_size(1, 0), 3);
}

#[test]
fn test_standard_configs_are_valid() {
    for config in interesting_configs(|_, _, _| true).unwrap() {
        assert!(quorum::validate(config.n(), config.f(), config.c()).is_ok());
        assert_eq!(config.num_clients(), 30);
    }
}
