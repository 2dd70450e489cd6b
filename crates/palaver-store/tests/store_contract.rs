// SPDX-FileCopyrightText: 2026 Palaver Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ordering and scoping properties every store must hold.

use std::sync::Arc;

use palaver_core::{ChatStore, NewMessage, NewSession, Sender, SessionId};
use palaver_store::MemoryStore;
use proptest::prelude::*;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

async fn session(store: &dyn ChatStore) -> SessionId {
    store
        .create_session(NewSession {
            visitor_name: "Grace".into(),
            visitor_email: "grace@example.com".into(),
            visitor_phone: Some("555-0100".into()),
        })
        .await
        .unwrap()
        .id
}

proptest! {
    #[test]
    fn snapshot_is_ordered_and_complete(
        writes in proptest::collection::vec((any::<bool>(), any::<bool>(), "[a-z]{1,8}"), 1..30)
    ) {
        runtime().block_on(async {
            let store: Arc<dyn ChatStore> = Arc::new(MemoryStore::default());
            let a = session(store.as_ref()).await;
            let b = session(store.as_ref()).await;
            let mut expected_a = Vec::new();
            for (to_a, admin, body) in &writes {
                let target = if *to_a { a } else { b };
                let sender = if *admin { Sender::Admin } else { Sender::Visitor };
                let msg = store
                    .create_message(NewMessage::new(target, sender, body).unwrap())
                    .await
                    .unwrap();
                if *to_a {
                    expected_a.push(msg.id);
                }
            }
            let listed = store.list_messages(a, None).await.unwrap();
            let ids: Vec<_> = listed.iter().map(|m| m.id).collect();
            prop_assert_eq!(ids, expected_a);
            prop_assert!(listed.windows(2).all(|w| w[0].created_at < w[1].created_at));
            Ok(())
        })?;
    }
}
