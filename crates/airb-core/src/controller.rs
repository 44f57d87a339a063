//! Request lifecycle controller
//!
//! Owns the `Idle -> Loading -> Success | Error` state machine and the two
//! live text fields (guide text, response text). Front-ends subscribe to
//! state changes and feed in the user's triggers: editing the guide text,
//! picking an image and sending.
//!
//! One request at a time: while Loading both triggers are inert. A send
//! snapshots the guide text and the selected handle, resolves the image,
//! builds the prompt and calls the model, strictly in that order. Every
//! failure along the way, panics included, ends in `ApiState::Error`.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::ai::InferenceClient;
use crate::error::ResolutionError;
use crate::media::{ContentResolver, ImageHandle, MediaResolver};
use crate::prompt;
use crate::state::{ApiState, StateStore};

pub const REQUEST_ABANDONED_MESSAGE: &str = "Request was cancelled before it finished.";

/// Result of a send trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// A request was already in flight; nothing happened.
    Ignored,
    /// The request ran to completion with this state.
    Settled(ApiState),
}

#[derive(Debug, Default)]
struct Fields {
    guide_text: String,
    selected_image: Option<ImageHandle>,
    response_text: String,
}

struct Inner<C, R> {
    client: C,
    content: Arc<R>,
    media: MediaResolver,
    store: StateStore,
    fields: Mutex<Fields>,
}

pub struct ReplyController<C, R> {
    inner: Arc<Inner<C, R>>,
}

impl<C, R> Clone for ReplyController<C, R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C, R> ReplyController<C, R>
where
    C: InferenceClient,
    R: ContentResolver,
{
    pub fn new(client: C, content: R, media: MediaResolver) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                content: Arc::new(content),
                media,
                store: StateStore::new(),
                fields: Mutex::new(Fields::default()),
            }),
        }
    }

    fn fields(&self) -> MutexGuard<'_, Fields> {
        self.inner
            .fields
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> watch::Receiver<ApiState> {
        self.inner.store.subscribe()
    }

    pub fn state(&self) -> ApiState {
        self.inner.store.current()
    }

    /// Whether the send and pick triggers are enabled
    pub fn can_send(&self) -> bool {
        !self.inner.store.current().is_loading()
    }

    pub fn guide_text(&self) -> String {
        self.fields().guide_text.clone()
    }

    pub fn set_guide_text(&self, text: impl Into<String>) {
        self.fields().guide_text = text.into();
    }

    pub fn selected_image(&self) -> Option<ImageHandle> {
        self.fields().selected_image.clone()
    }

    /// Read-only mirror of the last successful reply
    pub fn response_text(&self) -> String {
        self.fields().response_text.clone()
    }

    /// Deliver the picker's result. `None` means the picker was cancelled
    /// and clears the selection.
    ///
    /// Returns `false` without touching the selection while Loading.
    pub fn pick_image(&self, handle: Option<ImageHandle>) -> bool {
        if !self.can_send() {
            debug!("pick ignored: request in flight");
            return false;
        }
        match &handle {
            Some(h) => debug!(handle = %h, "image selected"),
            None => debug!("picker cancelled"),
        }
        self.fields().selected_image = handle;
        true
    }

    /// Run one request to completion on the current task.
    ///
    /// Dropping the future before it finishes settles the state to Error.
    pub async fn send(&self) -> SendOutcome {
        if !self.inner.store.begin_loading() {
            debug!("send ignored: request in flight");
            return SendOutcome::Ignored;
        }
        let request = self.snapshot();
        SendOutcome::Settled(self.complete(request).await)
    }

    /// Enter Loading now and finish the request on a background task.
    ///
    /// The guide text and image are captured before this returns, so later
    /// edits only affect the next send. Returns `None` if a request is
    /// already in flight.
    pub fn spawn_send(&self) -> Option<JoinHandle<ApiState>> {
        if !self.inner.store.begin_loading() {
            debug!("send ignored: request in flight");
            return None;
        }
        let request = self.snapshot();
        let this = self.clone();
        Some(tokio::spawn(async move { this.complete(request).await }))
    }

    fn snapshot(&self) -> ReplyRequest {
        let fields = self.fields();
        ReplyRequest {
            guide_text: fields.guide_text.clone(),
            image: fields.selected_image.clone(),
        }
    }

    /// Must only be called after a successful `begin_loading`.
    async fn complete(&self, request: ReplyRequest) -> ApiState {
        info!("Attempting to generate response");
        let mut guard = LoadingGuard {
            store: &self.inner.store,
            armed: true,
        };

        let result = AssertUnwindSafe(self.run(request))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(format!("Unexpected error: {}", panic_message(panic.as_ref())))
            });

        let state = match result {
            Ok(text) => {
                info!(chars = text.chars().count(), "reply generated");
                self.fields().response_text = text.clone();
                ApiState::Success(text)
            }
            Err(message) => {
                warn!(%message, "request failed");
                ApiState::Error(message)
            }
        };

        guard.armed = false;
        self.inner.store.settle(state.clone());
        state
    }

    async fn run(&self, request: ReplyRequest) -> Result<String, String> {
        let Some(handle) = request.image else {
            return Err(ResolutionError::NoImageSelected.to_string());
        };

        let image = self
            .inner
            .media
            .resolve(Arc::clone(&self.inner.content), Some(&handle))
            .await
            .map_err(|e| e.to_string())?;

        let prompt = prompt::build(&request.guide_text, image);
        debug!("prompt built");

        self.inner
            .client
            .generate(&prompt)
            .await
            .map_err(|e| e.user_message())
    }
}

/// Inputs captured at send time
#[derive(Debug, Clone)]
struct ReplyRequest {
    guide_text: String,
    image: Option<ImageHandle>,
}

/// Leaves Loading if the request future is dropped before it settles
struct LoadingGuard<'a> {
    store: &'a StateStore,
    armed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            warn!("request dropped before completion");
            self.store
                .settle(ApiState::Error(REQUEST_ABANDONED_MESSAGE.to_string()));
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{InferenceError, NO_IMAGE_MESSAGE};
    use crate::media::HostCapabilities;
    use crate::prompt::GeneratedPrompt;
    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat};
    use std::io::{self, Cursor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    enum Reply {
        Text(String),
        Fail(InferenceError),
        Panic,
    }

    struct MockClient {
        calls: Arc<AtomicUsize>,
        prompts: Arc<Mutex<Vec<String>>>,
        reply: Reply,
        started: Option<Arc<Notify>>,
        gate: Option<Arc<Notify>>,
    }

    impl MockClient {
        fn new(reply: Reply) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                prompts: Arc::new(Mutex::new(Vec::new())),
                reply,
                started: None,
                gate: None,
            }
        }
    }

    #[async_trait]
    impl InferenceClient for MockClient {
        async fn generate(&self, prompt: &GeneratedPrompt) -> Result<String, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.prompts
                .lock()
                .unwrap()
                .push(prompt.text().unwrap_or_default().to_string());
            if let Some(started) = &self.started {
                started.notify_one();
            }
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match &self.reply {
                Reply::Text(text) => Ok(text.clone()),
                Reply::Fail(err) => Err(err.clone()),
                Reply::Panic => panic!("model exploded"),
            }
        }
    }

    struct MockContent {
        opens: Arc<AtomicUsize>,
        bytes: Option<Vec<u8>>,
    }

    impl MockContent {
        fn png() -> Self {
            let mut buf = Vec::new();
            DynamicImage::new_rgb8(4, 4)
                .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
                .unwrap();
            Self {
                opens: Arc::new(AtomicUsize::new(0)),
                bytes: Some(buf),
            }
        }

        fn revoked() -> Self {
            Self {
                opens: Arc::new(AtomicUsize::new(0)),
                bytes: None,
            }
        }
    }

    impl ContentResolver for MockContent {
        fn open(&self, _handle: &ImageHandle) -> io::Result<Vec<u8>> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            self.bytes
                .clone()
                .ok_or_else(|| {
                    io::Error::new(io::ErrorKind::PermissionDenied, "permission revoked")
                })
        }
    }

    fn controller(
        client: MockClient,
        content: MockContent,
    ) -> ReplyController<MockClient, MockContent> {
        ReplyController::new(client, content, MediaResolver::new(HostCapabilities::default()))
    }

    fn handle() -> Option<ImageHandle> {
        Some(ImageHandle::new("content://media/picker/0/42"))
    }

    #[tokio::test]
    async fn test_success_mirrors_response() {
        let client = MockClient::new(Reply::Text("Sure thing! Here's ...".to_string()));
        let calls = client.calls.clone();
        let prompts = client.prompts.clone();
        let ctrl = controller(client, MockContent::png());

        ctrl.set_guide_text("I need the invoice");
        assert!(ctrl.pick_image(handle()));
        let outcome = ctrl.send().await;

        let expected = ApiState::Success("Sure thing! Here's ...".to_string());
        assert_eq!(outcome, SendOutcome::Settled(expected.clone()));
        assert_eq!(ctrl.state(), expected);
        assert_eq!(ctrl.response_text(), "Sure thing! Here's ...");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(prompts.lock().unwrap()[0].starts_with("tell them, I need the invoice\n\n"));
    }

    #[tokio::test]
    async fn test_no_image_skips_resolver_and_client() {
        let client = MockClient::new(Reply::Text("unused".to_string()));
        let calls = client.calls.clone();
        let content = MockContent::png();
        let opens = content.opens.clone();
        let ctrl = controller(client, content);

        let outcome = ctrl.send().await;

        assert_eq!(
            outcome,
            SendOutcome::Settled(ApiState::Error(NO_IMAGE_MESSAGE.to_string()))
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(opens.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancelled_pick_clears_selection() {
        let ctrl = controller(MockClient::new(Reply::Text("x".to_string())), MockContent::png());
        ctrl.pick_image(handle());
        ctrl.pick_image(None);
        assert!(ctrl.selected_image().is_none());
        assert_eq!(
            ctrl.send().await,
            SendOutcome::Settled(ApiState::Error(NO_IMAGE_MESSAGE.to_string()))
        );
    }

    #[tokio::test]
    async fn test_decode_failure_never_calls_client() {
        let client = MockClient::new(Reply::Text("unused".to_string()));
        let calls = client.calls.clone();
        let ctrl = controller(client, MockContent::revoked());
        ctrl.pick_image(handle());

        match ctrl.send().await {
            SendOutcome::Settled(ApiState::Error(msg)) => {
                assert!(msg.starts_with("Failed to load image from URI"));
                assert!(msg.contains("permission revoked"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_inference_failure_keeps_guide_text() {
        let client = MockClient::new(Reply::Fail(InferenceError::Transport(
            "connection reset by peer".to_string(),
        )));
        let ctrl = controller(client, MockContent::png());
        ctrl.set_guide_text("keep me");
        ctrl.pick_image(handle());

        let state = ctrl.send().await;
        match state {
            SendOutcome::Settled(ApiState::Error(msg)) => {
                assert!(msg.starts_with("API call failed: "));
                assert!(msg.contains("connection reset by peer"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(ctrl.guide_text(), "keep me");
        assert_eq!(ctrl.response_text(), "");
    }

    #[tokio::test]
    async fn test_panic_in_client_becomes_error_state() {
        let ctrl = controller(MockClient::new(Reply::Panic), MockContent::png());
        ctrl.pick_image(handle());

        match ctrl.send().await {
            SendOutcome::Settled(ApiState::Error(msg)) => assert!(msg.contains("model exploded")),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(ctrl.can_send());
    }

    #[tokio::test]
    async fn test_second_send_while_loading_is_inert() {
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let mut client = MockClient::new(Reply::Text("done".to_string()));
        client.started = Some(started.clone());
        client.gate = Some(gate.clone());
        let calls = client.calls.clone();
        let ctrl = controller(client, MockContent::png());
        ctrl.pick_image(handle());

        let task = ctrl.spawn_send().expect("first send should start");
        assert_eq!(ctrl.state(), ApiState::Loading);
        started.notified().await;

        assert!(!ctrl.can_send());
        assert_eq!(ctrl.send().await, SendOutcome::Ignored);
        assert!(ctrl.spawn_send().is_none());
        assert!(!ctrl.pick_image(None));
        assert!(ctrl.selected_image().is_some());

        gate.notify_one();
        assert_eq!(task.await.unwrap(), ApiState::Success("done".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_observer_sees_loading_then_settled() {
        let client = MockClient::new(Reply::Text("hello".to_string()));
        let ctrl = controller(client, MockContent::png());
        let mut rx = ctrl.subscribe();
        ctrl.pick_image(handle());

        let task = ctrl.spawn_send().unwrap();
        rx.changed().await.unwrap();
        let first = rx.borrow_and_update().clone();
        task.await.unwrap();

        assert!(first == ApiState::Loading || first == ApiState::Success("hello".to_string()));
        assert_eq!(*rx.borrow(), ApiState::Success("hello".to_string()));
    }

    #[tokio::test]
    async fn test_error_then_success_replaces_payload() {
        let client = MockClient::new(Reply::Text("second".to_string()));
        let ctrl = controller(client, MockContent::png());
        assert!(matches!(ctrl.send().await, SendOutcome::Settled(ApiState::Error(_))));

        ctrl.pick_image(handle());
        assert_eq!(
            ctrl.send().await,
            SendOutcome::Settled(ApiState::Success("second".to_string()))
        );
    }

    #[tokio::test]
    async fn test_edits_after_spawn_do_not_reach_inflight_request() {
        let client = MockClient::new(Reply::Text("ok".to_string()));
        let prompts = client.prompts.clone();
        let ctrl = controller(client, MockContent::png());
        ctrl.set_guide_text("original");
        ctrl.pick_image(handle());

        let task = ctrl.spawn_send().unwrap();
        ctrl.set_guide_text("edited while loading");
        task.await.unwrap();

        assert!(prompts.lock().unwrap()[0].starts_with("tell them, original\n\n"));
        assert_eq!(ctrl.guide_text(), "edited while loading");
    }

    #[tokio::test]
    async fn test_dropped_send_future_leaves_loading() {
        let mut client = MockClient::new(Reply::Text("never".to_string()));
        client.gate = Some(Arc::new(Notify::new()));
        let ctrl = controller(client, MockContent::png());
        ctrl.pick_image(handle());

        let timed_out = tokio::time::timeout(Duration::from_millis(200), ctrl.send()).await;
        assert!(timed_out.is_err());

        assert_eq!(
            ctrl.state(),
            ApiState::Error(REQUEST_ABANDONED_MESSAGE.to_string())
        );
        assert!(ctrl.can_send());
    }

    #[test]
    fn test_panic_message_downcasts() {
        let boxed: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(boxed.as_ref()), "static str");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(boxed.as_ref()), "owned");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(boxed.as_ref()), "unknown panic");
    }
}
