//! Cross-thread admission queue behavior. These tests exercise the producer
//! side only and need no GPU, so they run everywhere.

use std::sync::Arc;
use std::thread;

use voxvis::admission::{AdmissionQueue, PendingOp, PickResult, PickSlots};
use voxvis::{Transform, Visualizer};

fn name_of(op: &PendingOp) -> &str {
    match op {
        PendingOp::RemoveGeometry(name) => name,
        _ => panic!("unexpected op variant"),
    }
}

#[test]
fn concurrent_producers_lose_nothing_across_interleaved_drains() {
    let queue = Arc::new(AdmissionQueue::new());
    let producers = 8;
    let per_producer = 500;

    let handles: Vec<_> = (0..producers)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..per_producer {
                    queue.submit(PendingOp::RemoveGeometry(format!("p{p}-{i}")));
                }
            })
        })
        .collect();

    // Drain concurrently with the producers, the way the render thread does
    // once per frame.
    let mut drained: Vec<PendingOp> = Vec::new();
    while drained.len() < producers * per_producer {
        drained.extend(queue.drain());
    }
    for handle in handles {
        handle.join().unwrap();
    }
    drained.extend(queue.drain());

    assert_eq!(drained.len(), producers * per_producer);

    // Per-producer submission order must survive, whatever the interleaving
    // of producers and drains.
    let mut last_seen = vec![-1_i64; producers];
    for op in &drained {
        let (p, i) = name_of(op)[1..].split_once('-').unwrap();
        let p: usize = p.parse().unwrap();
        let i: i64 = i.parse().unwrap();
        assert!(
            i > last_seen[p],
            "producer {p} saw {i} after {}",
            last_seen[p]
        );
        last_seen[p] = i;
    }
    for (p, last) in last_seen.iter().enumerate() {
        assert_eq!(*last, per_producer as i64 - 1, "producer {p} lost ops");
    }
}

#[test]
fn mixed_op_kinds_drain_in_enqueue_order() {
    let queue = AdmissionQueue::new();
    queue.submit(PendingOp::SetTransform("a".into(), Transform::default()));
    queue.submit(PendingOp::RemoveGeometry("a".into()));
    queue.submit(PendingOp::SetTransform("b".into(), Transform::default()));

    let ops = queue.drain();
    assert_eq!(ops.len(), 3);
    assert!(matches!(&ops[0], PendingOp::SetTransform(n, _) if n == "a"));
    assert!(matches!(&ops[1], PendingOp::RemoveGeometry(n) if n == "a"));
    assert!(matches!(&ops[2], PendingOp::SetTransform(n, _) if n == "b"));
    assert!(queue.is_empty());
}

#[test]
fn pick_slots_keep_only_the_newest_request() {
    let slots = PickSlots::default();
    for i in 0..10 {
        slots.request(i, i);
    }
    let request = slots.take_request().unwrap();
    assert_eq!((request.x, request.y), (9, 9));
    assert!(slots.take_request().is_none());

    slots.deliver(PickResult::Miss);
    slots.deliver(PickResult::Hit("cube".into()));
    assert_eq!(slots.take_result(), Some(PickResult::Hit("cube".into())));
    assert!(slots.take_result().is_none());
}

#[test]
fn scene_client_rejects_mismatched_volume_sample_counts() {
    let (_visualizer, client) = Visualizer::new();

    let samples = vec![0.0_f32; 7];
    assert!(
        client
            .set_volume_scalar([2, 2, 2], [1.0; 3], &samples)
            .is_err()
    );
    let samples = vec![0.0_f32; 8];
    assert!(
        client
            .set_volume_scalar([2, 2, 2], [1.0; 3], &samples)
            .is_ok()
    );

    // Color volumes take RGB triplets.
    let samples = vec![0.0_f32; 8];
    assert!(
        client
            .set_volume_color([2, 2, 2], [1.0; 3], &samples)
            .is_err()
    );
    let samples = vec![0.0_f32; 24];
    assert!(
        client
            .set_volume_color([2, 2, 2], [1.0; 3], &samples)
            .is_ok()
    );
}

#[test]
fn scene_client_rejects_zero_volume_dimensions() {
    let (_visualizer, client) = Visualizer::new();

    // An all-zero extent with an empty slice would pass the sample-count
    // check (0 == 0) but describes a texture no device can allocate.
    assert!(client.set_volume_scalar([0, 0, 0], [1.0; 3], &[]).is_err());
    assert!(client.set_volume_scalar([4, 0, 4], [1.0; 3], &[]).is_err());
    assert!(client.set_volume_color([0, 0, 0], [1.0; 3], &[]).is_err());
    assert!(client.set_volume_color([2, 2, 0], [1.0; 3], &[]).is_err());
}

#[test]
fn client_handles_are_usable_from_many_threads() {
    let (_visualizer, client) = Visualizer::new();

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let client = client.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    client.set_transform(&format!("t{t}-{i}"), Transform::default());
                }
                client.request_pick_at(t, t);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // No result yet since no render thread is running.
    assert!(client.take_pick_result().is_none());
}
