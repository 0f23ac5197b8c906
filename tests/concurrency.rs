use std::collections::HashSet;

use slotmachine::{Boundaries, ConcurrencyMode, SlotMachine};

fn env_usize(name: &str, default: usize) -> usize {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
        .max(1)
}

/// Many threads book slots concurrently, then free what they booked.
///
/// No operation may fail, no two threads may hold the same slot, and the
/// available counter must return to its starting value.
fn stress(mode: ConcurrencyMode) {
    let slot_count = env_usize("SLOT_MACHINE_STRESS_SLOTS", 8192).next_power_of_two();
    let threads = env_usize("SLOT_MACHINE_STRESS_THREADS", 8);
    let bookings = env_usize("SLOT_MACHINE_STRESS_BOOKINGS", 64);
    assert!(threads * bookings <= slot_count);

    let mut storage = vec![0u32; slot_count];
    let machine = SlotMachine::<u32, u32>::new(
        mode,
        &mut storage,
        0,
        8,
        Some(Boundaries {
            lower: 0,
            upper: slot_count - 1,
        }),
    )
    .unwrap();
    let initial = machine.available();

    let booked: Vec<Vec<u32>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|thread| {
                let machine = &machine;
                scope.spawn(move || {
                    let mut mine = Vec::with_capacity(bookings);
                    for _ in 0..bookings {
                        let (slot, _) = machine.book_and_set(thread as u32 + 1).unwrap();
                        mine.push(slot);
                    }
                    mine
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    let mut seen = HashSet::new();
    for slots in &booked {
        for &slot in slots {
            assert!(seen.insert(slot), "slot {slot} booked twice");
        }
    }
    assert_eq!(
        machine.available(),
        initial - (threads * bookings) as u32
    );

    std::thread::scope(|scope| {
        for slots in &booked {
            let machine = &machine;
            scope.spawn(move || {
                for &slot in slots {
                    machine.unset(slot).unwrap();
                }
            });
        }
    });
    assert_eq!(machine.available(), initial);
}

#[test]
fn mutex_facade_survives_contention() {
    stress(ConcurrencyMode::Mutex);
}

#[test]
fn serialized_facade_survives_contention() {
    stress(ConcurrencyMode::Serialized);
}

/// Under the mutex façade a batch runs inside one lock acquisition, so in a
/// booking-only workload (the free region stays contiguous) every batch
/// comes back as consecutive indices even while other threads book singles.
#[test]
fn mutex_batch_stays_contiguous_under_contention() {
    let slot_count = 4096usize;
    let mut storage = vec![0u16; slot_count];
    let machine =
        SlotMachine::<u16, u16>::new(ConcurrencyMode::Mutex, &mut storage, 0, 8, None).unwrap();

    std::thread::scope(|scope| {
        for _ in 0..4 {
            let machine = &machine;
            scope.spawn(move || {
                for _ in 0..64 {
                    machine.book_and_set(1).unwrap();
                }
            });
        }

        let machine = &machine;
        scope.spawn(move || {
            for _ in 0..16 {
                let (booked, _) = machine.book_and_set_batch(16, 2).unwrap();
                for window in booked.windows(2) {
                    assert_eq!(window[1], window[0] + 1, "batch interleaved: {booked:?}");
                }
            }
        });
    });
}

/// Dropping a serialized machine stops its worker; the slice is writable and
/// carries the final payloads afterwards.
#[test]
fn serialized_teardown_releases_the_slice() {
    let mut storage = vec![0u16; 64];
    {
        let machine = SlotMachine::<u16, u16>::new(
            ConcurrencyMode::Serialized,
            &mut storage,
            0,
            8,
            None,
        )
        .unwrap();

        machine.book_and_set(11).unwrap();
        machine.book_and_set(22).unwrap();
        machine.unset(0).unwrap();
    }

    assert_eq!(storage[0], 0);
    assert_eq!(storage[1], 22);
    storage[5] = 99;
}
