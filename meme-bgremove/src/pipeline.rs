//! The background removal entry point.

use std::sync::Arc;

use crate::{HandleRegistry, ImageHandle, ImageRef, SegmentationError, SegmentationService};

/// Removes image backgrounds through a [`SegmentationService`].
///
/// Each call is independent: there is no shared mutable state between
/// invocations apart from the handle registry, and concurrent calls may
/// finish in any order. The remover never touches layer state; callers
/// decide what to do with a returned handle.
pub struct BackgroundRemover<S: ?Sized> {
    service: Arc<S>,
    handles: HandleRegistry,
}

impl<S: ?Sized> Clone for BackgroundRemover<S> {
    fn clone(&self) -> Self {
        Self {
            service: Arc::clone(&self.service),
            handles: self.handles.clone(),
        }
    }
}

impl<S: ?Sized> std::fmt::Debug for BackgroundRemover<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemover")
            .field("live_handles", &self.handles.live_count())
            .finish_non_exhaustive()
    }
}

impl<S: SegmentationService> BackgroundRemover<S> {
    /// Create a remover with its own handle registry.
    #[must_use]
    pub fn new(service: S) -> Self {
        Self::with_registry(Arc::new(service), HandleRegistry::new())
    }
}

impl<S: SegmentationService + ?Sized> BackgroundRemover<S> {
    /// Create a remover that registers handles in `handles`.
    #[must_use]
    pub fn with_registry(service: Arc<S>, handles: HandleRegistry) -> Self {
        Self { service, handles }
    }

    /// The registry results are registered in.
    #[must_use]
    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    /// Remove the background of `image`.
    ///
    /// Calls the service exactly once. On success the returned payload is
    /// registered under a fresh [`ImageHandle`]; the caller owns it and must
    /// revoke it through [`handles`](Self::handles) when done.
    ///
    /// No timeout and no retry are applied. The call cannot be cancelled:
    /// dropping the future abandons the result, and no handle is allocated
    /// unless the service has already answered.
    ///
    /// # Errors
    ///
    /// Returns the service's error unchanged after logging it.
    #[tracing::instrument(name = "remove_background", skip_all, fields(image = %image.summary()))]
    pub async fn remove_background(
        &self,
        image: &ImageRef,
    ) -> Result<ImageHandle, SegmentationError> {
        match self.service.segment(image).await {
            Ok(payload) => {
                let handle = self.handles.create(payload);
                tracing::info!(handle = %handle, "Background removed");
                Ok(handle)
            }
            Err(error) => {
                tracing::error!(%error, "Error removing background");
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ImagePayload;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SegmentationService for Echo {
        async fn segment(&self, image: &ImageRef) -> Result<ImagePayload, SegmentationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ImagePayload::new(
                image.as_str().as_bytes().to_vec(),
                Some("image/png".into()),
            ))
        }
    }

    struct Broken;

    #[async_trait]
    impl SegmentationService for Broken {
        async fn segment(&self, _image: &ImageRef) -> Result<ImagePayload, SegmentationError> {
            Err(SegmentationError::Service {
                status: 500,
                message: "model crashed".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_success_registers_handle() {
        let remover = BackgroundRemover::new(Echo {
            calls: AtomicUsize::new(0),
        });

        let handle = remover
            .remove_background(&ImageRef::new("https://memes.example/a.png"))
            .await
            .expect("handle");

        let payload = remover.handles().resolve(&handle).expect("live");
        assert_eq!(payload.bytes(), b"https://memes.example/a.png");
        assert_eq!(remover.handles().live_count(), 1);
        assert_eq!(remover.service.calls.load(Ordering::SeqCst), 1);

        assert!(remover.handles().revoke(handle));
    }

    #[tokio::test]
    async fn test_failure_is_returned_unchanged() {
        let remover = BackgroundRemover::new(Broken);

        let err = remover
            .remove_background(&ImageRef::new("https://memes.example/a.png"))
            .await
            .unwrap_err();

        match err {
            SegmentationError::Service { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "model crashed");
            }
            other => panic!("expected Service error, got {other:?}"),
        }
        assert_eq!(remover.handles().live_count(), 0);
    }

    #[tokio::test]
    async fn test_works_with_trait_object() {
        let service: Arc<dyn SegmentationService> = Arc::new(Echo {
            calls: AtomicUsize::new(0),
        });
        let remover = BackgroundRemover::with_registry(service, HandleRegistry::new());

        let handle = remover
            .remove_background(&ImageRef::new("x"))
            .await
            .expect("handle");
        assert!(remover.handles().revoke(handle));
    }
}
