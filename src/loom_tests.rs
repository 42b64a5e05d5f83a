#![cfg(all(test, feature = "loom"))]

use crate::core::{AtomicQueue, TailPublisher};
use crate::sync::{thread, AtomicUsize, Ordering};
use loom::sync::Arc;
use std::mem::MaybeUninit;

// Memory per iterasi model di-leak supaya queue bisa 'static untuk thread
// loom. Ukurannya beberapa slot saja.
fn leaked_queue(slots: usize) -> Arc<AtomicQueue<'static, u64>> {
    let memory: &'static mut [MaybeUninit<u64>] = Box::leak(
        std::iter::repeat_with(MaybeUninit::uninit)
            .take(slots)
            .collect::<Vec<_>>()
            .into_boxed_slice(),
    );
    Arc::new(AtomicQueue::new(memory))
}

fn drain(queue: &AtomicQueue<'_, u64>, into: &mut Vec<u64>) {
    loop {
        let value = queue.dequeue();
        if value == queue.empty_value() {
            break;
        }
        into.push(value);
    }
}

fn bounded() -> loom::model::Builder {
    let mut builder = loom::model::Builder::new();
    builder.preemption_bound = Some(3);
    builder
}

#[test]
fn two_producers_concurrent_consumer() {
    bounded().check(|| {
        let queue = leaked_queue(4);

        let producers: Vec<_> = [1u64, 2]
            .into_iter()
            .map(|value| {
                let queue = queue.clone();
                thread::spawn(move || {
                    assert!(queue.enqueue(value));
                })
            })
            .collect();

        // Dequeue bersamaan dengan producer: boleh kosong, tidak boleh blocking
        let mut received = Vec::new();
        let first = queue.dequeue();
        if first != 0 {
            received.push(first);
        }

        for producer in producers {
            producer.join().unwrap();
        }
        queue.end_enqueue();
        drain(&queue, &mut received);

        received.sort_unstable();
        assert_eq!(received, vec![1, 2]);
    });
}

#[test]
fn concurrent_consumers_take_each_value_once() {
    bounded().check(|| {
        let queue = leaked_queue(2);

        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                assert!(queue.enqueue(7));
            })
        };

        let consumer = {
            let queue = queue.clone();
            thread::spawn(move || queue.dequeue())
        };
        let mine = queue.dequeue();

        producer.join().unwrap();
        let theirs = consumer.join().unwrap();
        queue.end_enqueue();

        let mut received: Vec<u64> = [mine, theirs].into_iter().filter(|v| *v != 0).collect();
        drain(&queue, &mut received);
        assert_eq!(received, vec![7]);
    });
}

#[test]
fn range_and_single_enqueue_race() {
    bounded().check(|| {
        let queue = leaked_queue(3);

        let range = {
            let queue = queue.clone();
            thread::spawn(move || {
                assert!(queue.enqueue_range(&[1, 2]));
            })
        };
        assert!(queue.enqueue(3));
        range.join().unwrap();

        queue.end_enqueue();
        let mut received = Vec::new();
        drain(&queue, &mut received);

        // Range tetap berurutan dan kontigu
        let pos = received.iter().position(|v| *v == 1).unwrap();
        assert_eq!(received[pos + 1], 2);
        received.sort_unstable();
        assert_eq!(received, vec![1, 2, 3]);
    });
}

#[test]
fn tail_publisher_keeps_maximum() {
    loom::model(|| {
        let publisher = Arc::new(TailPublisher::new());
        let tail = Arc::new(AtomicUsize::new(0));

        let handle = {
            let publisher = publisher.clone();
            let tail = tail.clone();
            thread::spawn(move || {
                publisher.advance(&tail, 5);
            })
        };
        publisher.advance(&tail, 3);
        handle.join().unwrap();

        assert_eq!(tail.load(Ordering::Acquire), 5);
        assert!(!publisher.is_locked());
    });
}

#[test]
fn last_writer_publishes_full_queue() {
    bounded().check(|| {
        let queue = leaked_queue(1);

        let producers: Vec<_> = [1u64, 2]
            .into_iter()
            .map(|value| {
                let queue = queue.clone();
                thread::spawn(move || (value, queue.enqueue(value)))
            })
            .collect();

        // Tanpa end_enqueue: nilai pemenang harus tetap terpublish, siapa pun
        // writer terakhir yang keluar
        let received = loop {
            let value = queue.dequeue();
            if value != queue.empty_value() {
                break value;
            }
            thread::yield_now();
        };

        let results: Vec<(u64, bool)> = producers.into_iter().map(|p| p.join().unwrap()).collect();
        let winners: Vec<u64> = results
            .iter()
            .filter(|(_, ok)| *ok)
            .map(|(value, _)| *value)
            .collect();
        assert_eq!(winners, vec![received]);
        assert_eq!(queue.claimed_len(), 1);
    });
}
