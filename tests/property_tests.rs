//! Property-based tests for hybrid pagination and node status offloading

use chrono::{Duration, Utc};
use flowgate::hydrator::Hydrator;
use flowgate::offload::{MemoryOffloadStore, OffloadPolicy};
use flowgate::paginator::HybridPaginator;
use flowgate::query::ListQuery;
use flowgate::source::{ClientLiveSource, MemoryArchive, MemorySubstrate};
use flowgate::workflow::{Node, NodeType, Phase, Workflow};
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn workflow(name: String, finished_minutes_ago: Option<i64>) -> Workflow {
    let now = Utc::now();
    let mut wf = Workflow::new("ns1", name.clone());
    wf.metadata.uid = format!("uid-{}", name);
    wf.metadata.creation_timestamp = Some(now - Duration::days(30));
    match finished_minutes_ago {
        Some(minutes) => {
            wf.status.phase = Phase::Succeeded;
            wf.status.finished_at = Some(now - Duration::minutes(minutes));
        }
        None => wf.status.phase = Phase::Running,
    }
    wf
}

fn paginator(live: usize, archived: usize) -> HybridPaginator {
    let substrate = MemorySubstrate::new();
    for i in 0..live {
        let finished = if i % 3 == 0 { None } else { Some(i as i64) };
        substrate.insert_workflow(workflow(format!("live-{}", i), finished));
    }
    let archived = (0..archived)
        .map(|i| workflow(format!("old-{}", i), Some((live + i) as i64 * 10)))
        .collect();
    HybridPaginator::new(
        Arc::new(ClientLiveSource::new(Arc::new(substrate))),
        Arc::new(MemoryArchive::from_workflows(archived)),
    )
}

/// Following continue tokens visits every workflow exactly once
#[test]
fn test_pages_partition_live_and_archive() {
    let rt = Runtime::new().unwrap();
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(0usize..12, 0usize..12, 1usize..6), |(live, archived, page_size)| {
            let paginator = paginator(live, archived);
            let mut seen = BTreeSet::new();
            let mut offset = 0;
            let mut pages = 0;
            loop {
                let mut query = ListQuery::new("ns1").with_window(offset, page_size);
                query.show_remaining_item_count = true;
                let page = rt.block_on(paginator.list(&query)).unwrap();
                prop_assert!(page.items.len() <= page_size);
                for wf in &page.items {
                    prop_assert!(seen.insert(wf.name().to_string()), "duplicate {}", wf.name());
                }
                prop_assert_eq!(
                    page.metadata.remaining_item_count,
                    Some((live + archived - seen.len()) as u64)
                );
                pages += 1;
                if page.metadata.continue_token.is_empty() {
                    break;
                }
                offset = page.metadata.continue_token.parse().unwrap();
                prop_assert_eq!(offset, seen.len());
            }
            prop_assert_eq!(seen.len(), live + archived);
            prop_assert!(pages <= (live + archived) / page_size + 1);
            Ok(())
        })
        .unwrap();
}

/// An unlimited list returns the live and archived workflows together
#[test]
fn test_unlimited_list_is_union() {
    let rt = Runtime::new().unwrap();
    let mut runner = proptest::test_runner::TestRunner::default();

    runner
        .run(&(0usize..20, 0usize..20), |(live, archived)| {
            let page = rt
                .block_on(paginator(live, archived).list(&ListQuery::new("ns1")))
                .unwrap();
            prop_assert_eq!(page.items.len(), live + archived);
            prop_assert!(page.metadata.continue_token.is_empty());
            Ok(())
        })
        .unwrap();
}

/// Dehydrating then hydrating restores the node mapping exactly
#[test]
fn test_offload_round_trip() {
    let rt = Runtime::new().unwrap();
    let mut runner = proptest::test_runner::TestRunner::default();
    let policy = OffloadPolicy {
        enabled: true,
        max_inline_bytes: 1024 * 1024,
        always_offload: true,
    };

    runner
        .run(
            &proptest::collection::btree_map("[a-z]{1,8}", "[a-z ]{0,16}", 1..10),
            |entries| {
                let hydrator = Hydrator::new(Arc::new(MemoryOffloadStore::new(policy)));
                let mut wf = workflow("big".to_string(), None);
                for (id, message) in &entries {
                    let mut node = Node::new(id.as_str(), format!("big.{}", id), NodeType::Pod)
                        .with_phase(Phase::Running);
                    node.message = message.clone();
                    wf.status.nodes.insert(id.clone(), node);
                }
                let original = wf.status.nodes.clone();

                rt.block_on(hydrator.dehydrate(&mut wf)).unwrap();
                prop_assert!(wf.status.is_offloaded());
                prop_assert!(wf.status.nodes.is_empty());
                prop_assert_eq!(wf.phase(), Phase::Running);

                rt.block_on(hydrator.hydrate(&mut wf)).unwrap();
                prop_assert!(Hydrator::is_hydrated(&wf));
                prop_assert_eq!(&wf.status.nodes, &original);
                Ok(())
            },
        )
        .unwrap();
}
