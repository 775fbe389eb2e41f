//! Identity token uniqueness under colliding short hashes.

use std::collections::HashSet;
use std::sync::Mutex;

use proptest::prelude::*;
use sluice_pool::identity::{IdentityTokenAllocator, allocate_identity_token};

fn colliding() -> IdentityTokenAllocator {
    IdentityTokenAllocator::with_hasher(|_| 0x2a)
}

// ---------------------------------------------------------------------------
// Engineered collisions
// ---------------------------------------------------------------------------

#[test]
fn colliding_handles_are_suffixed_in_encounter_order() {
    let allocator = colliding();
    let handles: Vec<Box<u64>> = (0..4).map(Box::new).collect();

    let tokens: Vec<String> = handles
        .iter()
        .map(|h| allocator.allocate(Some(h.as_ref())).unwrap().to_string())
        .collect();

    assert_eq!(tokens, ["2a", "2a#1", "2a#2", "2a#3"]);
}

#[test]
fn distinct_short_hashes_are_never_suffixed() {
    let allocator = IdentityTokenAllocator::with_hasher(|addr| addr as u32);
    let a = 1u8;
    let b = 2u8;
    let ta = allocator.allocate(Some(&a)).unwrap();
    let tb = allocator.allocate(Some(&b)).unwrap();
    assert_ne!(ta, tb);
    assert!(!ta.is_disambiguated());
    assert!(!tb.is_disambiguated());
}

#[test]
fn global_allocator_never_repeats() {
    let values: Vec<String> = (0..128).map(|i| format!("pool-{i}")).collect();
    let tokens: HashSet<_> = values
        .iter()
        .chain(values.iter())
        .map(|v| allocate_identity_token(Some(v.as_str())).unwrap())
        .collect();
    assert_eq!(tokens.len(), 256);
}

#[test]
fn concurrent_allocation_stays_unique() {
    let allocator = colliding();
    let seen = Mutex::new(Vec::new());

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                let handle = 0u32;
                let mut local = Vec::with_capacity(200);
                for _ in 0..200 {
                    local.push(allocator.allocate(Some(&handle)).unwrap());
                }
                seen.lock().unwrap().extend(local);
            });
        }
    });

    let seen = seen.into_inner().unwrap();
    let unique: HashSet<_> = seen.iter().collect();
    assert_eq!(seen.len(), 1600);
    assert_eq!(unique.len(), 1600);
    assert_eq!(allocator.encounters("2a"), 1600);
}

// ---------------------------------------------------------------------------
// Property: N allocations, N distinct tokens
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn n_colliding_allocations_yield_n_distinct_tokens(n in 1usize..64) {
        let allocator = colliding();
        let handles: Vec<Box<usize>> = (0..n).map(Box::new).collect();

        let tokens: Vec<_> = handles
            .iter()
            .map(|h| allocator.allocate(Some(h.as_ref())).unwrap())
            .collect();

        let unique: HashSet<_> = tokens.iter().collect();
        prop_assert_eq!(unique.len(), n);
        prop_assert!(!tokens[0].is_disambiguated());
        for (i, token) in tokens.iter().enumerate().skip(1) {
            prop_assert_eq!(token.as_str(), format!("2a#{i}"));
        }
    }
}
