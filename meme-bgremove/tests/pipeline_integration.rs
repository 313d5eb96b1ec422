//! Background Removal Integration Tests
//!
//! Tests the removal flow together with the layer store:
//! - Successful removal placed as a new image layer
//! - Failed removal leaves the store untouched
//! - Concurrent calls stay independent
//! - Handle release when a layer goes away

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use meme_bgremove::{
    BackgroundRemover, HandleRegistry, HttpSegmentationService, ImagePayload, ImageRef,
    SegmentationError, SegmentationService,
};
use meme_core::{Layer, LayerId, LayerKind, LayerStore};

/// Returns the input reference, reversed, as the "cut-out" bytes.
struct ReversingStub {
    calls: AtomicUsize,
    delays: HashMap<String, Duration>,
}

impl ReversingStub {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delays: HashMap::new(),
        }
    }

    fn with_delay(mut self, image: &str, delay: Duration) -> Self {
        self.delays.insert(image.to_string(), delay);
        self
    }
}

#[async_trait]
impl SegmentationService for ReversingStub {
    async fn segment(&self, image: &ImageRef) -> Result<ImagePayload, SegmentationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delays.get(image.as_str()) {
            tokio::time::sleep(*delay).await;
        }
        let bytes = image.as_str().bytes().rev().collect();
        Ok(ImagePayload::new(bytes, Some("image/png".into())))
    }
}

/// Fails every call with a network-style error.
struct OfflineStub {
    calls: AtomicUsize,
}

#[async_trait]
impl SegmentationService for OfflineStub {
    async fn segment(&self, _image: &ImageRef) -> Result<ImagePayload, SegmentationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(SegmentationError::backend("network unreachable"))
    }
}

fn meme_store() -> LayerStore {
    let store = LayerStore::new();
    store.set_layers(vec![
        Layer::image(1, "https://memes.example/photo.jpg"),
        Layer::text(2, "WHEN THE BACKGROUND").with_position(20.0, 20.0),
    ]);
    store
}

// ============================================================================
// Success Path
// ============================================================================

#[tokio::test]
async fn test_removed_background_becomes_image_layer() {
    let store = meme_store();
    let remover = BackgroundRemover::new(ReversingStub::new());

    let source = ImageRef::new("https://memes.example/photo.jpg");
    let handle = remover.remove_background(&source).await.expect("removal");

    store
        .add_layer(Layer::image(3, handle.url()).with_position(100.0, 80.0))
        .expect("add cut-out layer");

    let layer = store.layer(LayerId::new(3)).expect("new layer");
    assert_eq!(layer.kind, LayerKind::Image);
    let src = layer.attr("src").and_then(|v| v.as_str()).expect("src");
    let payload = remover.handles().resolve_url(src).expect("resolvable src");
    assert_eq!(payload.bytes(), b"gpj.otohp/elpmaxe.semem//:sptth");

    assert!(remover.handles().revoke(handle));
}

#[tokio::test]
async fn test_each_call_yields_a_distinct_handle() {
    let remover = BackgroundRemover::new(ReversingStub::new());
    let source = ImageRef::new("https://memes.example/photo.jpg");

    let first = remover.remove_background(&source).await.expect("first");
    let second = remover.remove_background(&source).await.expect("second");

    assert_ne!(first.url(), second.url());
    assert_eq!(remover.handles().live_count(), 2);

    remover.handles().revoke(first);
    remover.handles().revoke(second);
    assert_eq!(remover.handles().live_count(), 0);
}

// ============================================================================
// Failure Path
// ============================================================================

#[tokio::test]
async fn test_failed_removal_leaves_store_untouched() {
    let store = meme_store();
    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notifications);
    let _sub = store.subscribe_layers(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let before = store.layers();

    let remover = BackgroundRemover::new(OfflineStub {
        calls: AtomicUsize::new(0),
    });
    let result = remover
        .remove_background(&ImageRef::new("https://memes.example/photo.jpg"))
        .await;

    match result {
        Err(SegmentationError::Backend(message)) => assert_eq!(message, "network unreachable"),
        other => panic!("expected Backend error, got {other:?}"),
    }
    // One initial delivery from subscribing, nothing after.
    assert_eq!(notifications.load(Ordering::SeqCst), 1);
    assert!(Arc::ptr_eq(&before, &store.layers()));
    assert_eq!(remover.handles().live_count(), 0);
}

#[tokio::test]
async fn test_failure_is_not_retried() {
    let stub = Arc::new(OfflineStub {
        calls: AtomicUsize::new(0),
    });
    let remover = BackgroundRemover::with_registry(Arc::clone(&stub), HandleRegistry::new());

    let _ = remover
        .remove_background(&ImageRef::new("data:image/png;base64,AAAA"))
        .await;

    assert_eq!(stub.calls.load(Ordering::SeqCst), 1);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_concurrent_calls_are_independent() {
    let stub = ReversingStub::new()
        .with_delay("slow", Duration::from_millis(60))
        .with_delay("fast", Duration::from_millis(5));
    let remover = BackgroundRemover::new(stub);
    let finished = Arc::new(Mutex::new(Vec::new()));

    let run = |name: &'static str| {
        let remover = remover.clone();
        let finished = Arc::clone(&finished);
        async move {
            let handle = remover
                .remove_background(&ImageRef::new(name))
                .await
                .expect("removal");
            finished.lock().expect("lock").push(name);
            handle
        }
    };

    let (slow, fast) = futures::join!(run("slow"), run("fast"));

    // Completion order follows the service, not the call order.
    assert_eq!(*finished.lock().expect("lock"), vec!["fast", "slow"]);

    let handles = remover.handles();
    assert_eq!(handles.resolve(&slow).expect("slow").bytes(), b"wols");
    assert_eq!(handles.resolve(&fast).expect("fast").bytes(), b"tsaf");
    handles.revoke(slow);
    handles.revoke(fast);
}

// ============================================================================
// Handle Lifetime
// ============================================================================

#[tokio::test]
async fn test_removing_layer_then_revoking_its_source() {
    let store = meme_store();
    let remover = BackgroundRemover::new(ReversingStub::new());
    let handle = remover
        .remove_background(&ImageRef::new("https://memes.example/photo.jpg"))
        .await
        .expect("removal");
    store
        .add_layer(Layer::image(3, handle.url()))
        .expect("add layer");
    drop(handle);

    // The handle value is gone but the payload is still registered.
    assert_eq!(remover.handles().live_count(), 1);

    let removed = store
        .remove_layer(LayerId::new(3))
        .expect("remove")
        .expect("layer existed");
    let src = removed.attr("src").and_then(|v| v.as_str()).expect("src");

    assert!(remover.handles().revoke_url(src));
    assert_eq!(remover.handles().live_count(), 0);
}

#[tokio::test]
async fn test_handle_can_be_fed_back_as_input() {
    let remover = BackgroundRemover::new(ReversingStub::new());
    let first = remover
        .remove_background(&ImageRef::new("https://memes.example/photo.jpg"))
        .await
        .expect("first pass");

    let second = remover
        .remove_background(&first.as_image_ref())
        .await
        .expect("second pass");

    let expected: Vec<u8> = first.url().bytes().rev().collect();
    assert_eq!(
        remover.handles().resolve(&second).expect("live").bytes(),
        expected.as_slice()
    );
    remover.handles().revoke(first);
    remover.handles().revoke(second);
}

// ============================================================================
// HTTP End To End
// ============================================================================

#[tokio::test]
#[cfg_attr(
    target_os = "macos",
    ignore = "wiremock/reqwest system-configuration issue on macOS"
)]
async fn test_http_service_failure_propagates_through_pipeline() {
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("inference failed"))
        .expect(1)
        .mount(&server)
        .await;

    let store = meme_store();
    let before = store.layers();
    let remover =
        BackgroundRemover::new(HttpSegmentationService::new(server.uri()).expect("service"));

    let err = remover
        .remove_background(&ImageRef::new("https://memes.example/photo.jpg"))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SegmentationError::Service { status: 500, ref message } if message == "inference failed"
    ));
    assert!(Arc::ptr_eq(&before, &store.layers()));
    assert_eq!(remover.handles().live_count(), 0);
}
