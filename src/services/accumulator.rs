use futures::{Stream, StreamExt};

/// Outcome of draining a fragment stream.
///
/// `text` always holds every non-empty fragment received before the stream
/// ended, in arrival order. `error` is set when the producer failed, in which
/// case `text` is whatever arrived before the failure.
#[derive(Debug)]
pub struct Accumulation<E> {
    pub text: String,
    pub fragments: usize,
    pub error: Option<E>,
}

impl<E> Accumulation<E> {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    fragments: usize,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one fragment. Returns false for empty fragments, which are dropped.
    pub fn push(&mut self, fragment: &str) -> bool {
        if fragment.is_empty() {
            return false;
        }
        self.text.push_str(fragment);
        self.fragments += 1;
        true
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Pulls fragments until the stream ends or yields an error.
    pub async fn collect<S, E>(self, stream: S) -> Accumulation<E>
    where
        S: Stream<Item = Result<String, E>>,
    {
        self.collect_with(stream, |_| {}).await
    }

    /// Like [`collect`](Self::collect), calling `observer` with each non-empty
    /// fragment before the next one is requested.
    pub async fn collect_with<S, E, F>(mut self, stream: S, mut observer: F) -> Accumulation<E>
    where
        S: Stream<Item = Result<String, E>>,
        F: FnMut(&str),
    {
        let mut stream = std::pin::pin!(stream);
        let mut error = None;

        while let Some(item) = stream.next().await {
            match item {
                Ok(fragment) => {
                    if self.push(&fragment) {
                        observer(&fragment);
                    }
                }
                Err(e) => {
                    error = Some(e);
                    break;
                }
            }
        }

        Accumulation {
            text: self.text,
            fragments: self.fragments,
            error,
        }
    }
}
