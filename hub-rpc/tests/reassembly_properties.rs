//! Property tests for fragment reassembly.

use bytes::Bytes;
use hub_rpc::pool::BufferPool;
use hub_rpc::reassembly::Reassembler;
use hub_transport::Fragment;
use proptest::prelude::*;

/// Split `message` at the given (sorted, deduplicated) cut points
fn fragments(message: &[u8], mut cuts: Vec<usize>) -> Vec<Fragment> {
    cuts.retain(|&cut| cut > 0 && cut < message.len());
    cuts.sort_unstable();
    cuts.dedup();

    let mut bounds = vec![0];
    bounds.extend(cuts);
    bounds.push(message.len());

    let last = bounds.len() - 2;
    bounds
        .windows(2)
        .enumerate()
        .map(|(i, window)| Fragment {
            data: Bytes::copy_from_slice(&message[window[0]..window[1]]),
            end_of_message: i == last,
        })
        .collect()
}

proptest! {
    #[test]
    fn any_split_yields_one_identical_message(
        message in proptest::collection::vec(any::<u8>(), 1..2048),
        cuts in proptest::collection::vec(0usize..2048, 0..16),
    ) {
        let pool = BufferPool::new(2, 64, 4096);
        let mut reassembler = Reassembler::new(pool, 4096);

        let mut delivered = Vec::new();
        for fragment in fragments(&message, cuts) {
            if let Some(complete) = reassembler.push(fragment).unwrap() {
                delivered.push(complete.to_vec());
            }
        }

        prop_assert_eq!(delivered.len(), 1);
        prop_assert_eq!(&delivered[0], &message);
        prop_assert!(!reassembler.has_partial());
    }

    #[test]
    fn consecutive_messages_stay_separate(
        first in proptest::collection::vec(any::<u8>(), 1..256),
        second in proptest::collection::vec(any::<u8>(), 1..256),
        cut in 1usize..256,
    ) {
        let pool = BufferPool::new(2, 16, 1024);
        let mut reassembler = Reassembler::new(pool.clone(), 1024);

        let mut stream = fragments(&first, vec![cut]);
        stream.extend(fragments(&second, vec![]));

        let delivered: Vec<Vec<u8>> = stream
            .into_iter()
            .filter_map(|fragment| reassembler.push(fragment).unwrap())
            .map(|message| message.to_vec())
            .collect();

        prop_assert_eq!(delivered, vec![first, second]);
        // Pooled buffers went back once their message was consumed
        prop_assert!(pool.available() <= 2);
    }
}
