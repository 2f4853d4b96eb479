//! Example: two offline replicas editing one document, then syncing.

use crdt_oplog::clock::HybridClock;
use crdt_oplog::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct Recipe {
    title: String,
    servings: u32,
}

fn main() {
    println!("=== Shared recipe (operation-log CRDT) ===\n");

    let mut alice_clock = HybridClock::new(1);
    let mut bob_clock = HybridClock::new(2);

    // Alice creates the recipe while offline.
    let mut alice = CrdtManager::<Recipe>::new();
    let create = alice
        .make_create_with(
            alice_clock.now(),
            &Recipe {
                title: "Pancakes".into(),
                servings: 2,
            },
        )
        .expect("recipe serializes");
    alice.append(create);
    println!("Alice created: {:?}", alice.value());

    // Bob starts from Alice's last sync point.
    let mut bob = alice.clone();

    // Both edit independently.
    let scaled = alice
        .make_update(
            alice_clock.now(),
            &Recipe {
                title: "Pancakes".into(),
                servings: 4,
            },
        )
        .expect("recipe serializes");
    alice.append(scaled);
    println!("Alice scaled servings: {:?}", alice.value());

    let renamed = bob
        .make_update(
            bob_clock.now(),
            &Recipe {
                title: "Blueberry pancakes".into(),
                servings: 2,
            },
        )
        .expect("recipe serializes");
    bob.append(renamed);
    println!("Bob renamed: {:?}", bob.value());

    // They sync by exchanging their operation sets.
    alice.merge(&bob);
    bob.merge(&alice);

    println!("\n--- After sync ---");
    println!("Alice sees: {:?}", alice.value());
    println!("Bob sees:   {:?}", bob.value());
    assert_eq!(alice, bob);

    // Bob deletes the recipe; later edits cannot bring it back.
    bob.append(bob.make_delete(bob_clock.now()));
    alice.merge(&bob);
    println!("\nBob deleted the recipe.");
    println!("Alice sees: {:?}", alice.value());

    let too_late = alice_clock.now();
    let stray = alice
        .make_update(
            too_late,
            &Recipe {
                title: "Waffles".into(),
                servings: 1,
            },
        )
        .expect("recipe serializes");
    alice.append(stray);
    println!("A later edit changes nothing: {:?}", alice.value());
}
