//! Async driver: consumes a chunk stream, publishes a snapshot after every
//! update and resolves image-generation side effects concurrently on the same
//! task.

use crate::error::NovaError;
use crate::images::{ImageData, ImageResolution, SideEffect};
use crate::merge::PagedAccumulator;
use crate::model::ResponseModel;
use crate::options::Options;
use crate::recovery::RecoveryLogEntry;
use crate::stream::TurnParser;
use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, Stream, StreamExt};
use std::fmt::Display;
use tokio::sync::{mpsc, watch};

/// Whether the consumer still wants snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverFlow {
    Continue,
    Stop,
}

/// Receives a snapshot after every chunk and every image result.
pub trait SnapshotObserver {
    fn observe(&mut self, snapshot: &ResponseModel) -> ObserverFlow;
}

impl SnapshotObserver for watch::Sender<ResponseModel> {
    fn observe(&mut self, snapshot: &ResponseModel) -> ObserverFlow {
        match self.send(snapshot.clone()) {
            Ok(()) => ObserverFlow::Continue,
            Err(_) => ObserverFlow::Stop,
        }
    }
}

impl SnapshotObserver for mpsc::UnboundedSender<ResponseModel> {
    fn observe(&mut self, snapshot: &ResponseModel) -> ObserverFlow {
        match self.send(snapshot.clone()) {
            Ok(()) => ObserverFlow::Continue,
            Err(_) => ObserverFlow::Stop,
        }
    }
}

impl SnapshotObserver for Vec<ResponseModel> {
    fn observe(&mut self, snapshot: &ResponseModel) -> ObserverFlow {
        self.push(snapshot.clone());
        ObserverFlow::Continue
    }
}

/// Adapter for closures.
pub struct ObserveFn<F>(pub F);

impl<F> SnapshotObserver for ObserveFn<F>
where
    F: FnMut(&ResponseModel) -> ObserverFlow,
{
    fn observe(&mut self, snapshot: &ResponseModel) -> ObserverFlow {
        (self.0)(snapshot)
    }
}

/// Backend that turns a prompt into an image.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<ImageData, String>;
}

#[derive(Debug)]
pub enum TurnEnd {
    /// The stream was exhausted.
    Finished,
    /// The stream failed; the model carries the localized error message.
    Failed(NovaError),
    /// The observer stopped listening; reading stopped after the current chunk.
    Cancelled,
}

#[derive(Debug)]
pub struct TurnOutcome {
    pub model: ResponseModel,
    pub end: TurnEnd,
    pub log: Vec<RecoveryLogEntry>,
}

impl TurnOutcome {
    pub fn is_finished(&self) -> bool {
        matches!(self.end, TurnEnd::Finished)
    }
}

type ImageTasks<'a> = FuturesUnordered<BoxFuture<'a, ImageResolution>>;

fn schedule_images<'a>(
    effects: Vec<SideEffect>,
    images: Option<&'a dyn ImageGenerator>,
    tasks: &mut ImageTasks<'a>,
    mut resolve_now: impl FnMut(ImageResolution),
) {
    for effect in effects {
        let SideEffect::GenerateImage {
            placeholder_id,
            prompt,
        } = effect;
        match images {
            Some(generator) => tasks.push(Box::pin(async move {
                let result = generator.generate(&prompt).await;
                ImageResolution {
                    placeholder_id,
                    result,
                }
            })),
            None => resolve_now(ImageResolution::failed(placeholder_id, "no image generator configured")),
        }
    }
}

/// Drive one turn to completion.
///
/// Snapshots are published after every chunk. When the observer reports
/// `Stop`, no further chunk is read, pending image requests are dropped and
/// the model is finalized. A stream error ends the turn with
/// `Messages::transport_error` as its text; image requests already in flight
/// still complete.
pub async fn run_turn<S, E, O>(
    stream: S,
    opts: &Options,
    images: Option<&dyn ImageGenerator>,
    observer: &mut O,
) -> Result<TurnOutcome, NovaError>
where
    S: Stream<Item = Result<String, E>>,
    E: Display,
    O: SnapshotObserver + ?Sized,
{
    let mut parser = TurnParser::new(opts.clone())?;
    let mut tasks: ImageTasks<'_> = FuturesUnordered::new();
    let mut stream = std::pin::pin!(stream);

    if observer.observe(parser.model()) == ObserverFlow::Stop {
        parser.finish();
        return Ok(outcome(parser, TurnEnd::Cancelled));
    }

    let end = loop {
        tokio::select! {
            Some(resolution) = tasks.next(), if !tasks.is_empty() => {
                parser.apply_image(resolution);
            }
            item = stream.next() => match item {
                Some(Ok(chunk)) => {
                    let effects = parser.push(&chunk)?;
                    let mut immediate = Vec::new();
                    schedule_images(effects, images, &mut tasks, |r| immediate.push(r));
                    for r in immediate {
                        parser.apply_image(r);
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "chunk stream failed");
                    parser.fail(&opts.messages.transport_error);
                    break TurnEnd::Failed(NovaError::Transport(err.to_string()));
                }
                None => {
                    let effects = parser.finish();
                    let mut immediate = Vec::new();
                    schedule_images(effects, images, &mut tasks, |r| immediate.push(r));
                    for r in immediate {
                        parser.apply_image(r);
                    }
                    break TurnEnd::Finished;
                }
            }
        }
        if observer.observe(parser.model()) == ObserverFlow::Stop {
            tracing::debug!("observer stopped; abandoning turn");
            parser.finish();
            return Ok(outcome(parser, TurnEnd::Cancelled));
        }
    };

    if observer.observe(parser.model()) == ObserverFlow::Stop {
        return Ok(outcome(parser, end));
    }
    while let Some(resolution) = tasks.next().await {
        parser.apply_image(resolution);
        if observer.observe(parser.model()) == ObserverFlow::Stop {
            break;
        }
    }
    Ok(outcome(parser, end))
}

fn outcome(parser: TurnParser, end: TurnEnd) -> TurnOutcome {
    let log = parser.log().to_vec();
    TurnOutcome {
        model: parser.into_model(),
        end,
        log,
    }
}

/// Drive a multi-page document, one stream per page, merging every page into
/// a cross-page accumulator. The observer sees the accumulated model.
pub async fn run_paged_turn<P, S, E, O>(
    pages: P,
    opts: &Options,
    images: Option<&dyn ImageGenerator>,
    observer: &mut O,
) -> Result<TurnOutcome, NovaError>
where
    P: IntoIterator<Item = S>,
    S: Stream<Item = Result<String, E>>,
    E: Display,
    O: SnapshotObserver + ?Sized,
{
    let mut acc = PagedAccumulator::new(opts);
    let mut tasks: ImageTasks<'_> = FuturesUnordered::new();
    let mut log = Vec::new();

    let mut end = TurnEnd::Finished;
    'pages: for (page, stream) in pages.into_iter().enumerate() {
        let mut parser = TurnParser::for_page(opts.clone(), page)?;
        let mut stream = std::pin::pin!(stream);
        tracing::debug!(page, "page started");
        loop {
            tokio::select! {
                Some(resolution) = tasks.next(), if !tasks.is_empty() => {
                    acc.apply_image(resolution);
                }
                item = stream.next() => match item {
                    Some(Ok(chunk)) => {
                        let effects = parser.push(&chunk)?;
                        acc.merge_page(page, parser.model());
                        let mut immediate = Vec::new();
                        schedule_images(effects, images, &mut tasks, |r| immediate.push(r));
                        for r in immediate {
                            acc.apply_image(r);
                        }
                    }
                    Some(Err(err)) => {
                        tracing::warn!(page, error = %err, "chunk stream failed");
                        log.extend_from_slice(parser.log());
                        acc.fail(&opts.messages.transport_error);
                        end = TurnEnd::Failed(NovaError::Transport(err.to_string()));
                        break 'pages;
                    }
                    None => {
                        let effects = parser.finish();
                        acc.merge_page(page, parser.model());
                        let mut immediate = Vec::new();
                        schedule_images(effects, images, &mut tasks, |r| immediate.push(r));
                        for r in immediate {
                            acc.apply_image(r);
                        }
                        log.extend_from_slice(parser.log());
                        break;
                    }
                }
            }
            if observer.observe(acc.model()) == ObserverFlow::Stop {
                acc.finish();
                return Ok(TurnOutcome {
                    model: acc.snapshot(),
                    end: TurnEnd::Cancelled,
                    log,
                });
            }
        }
    }
    acc.finish();
    if observer.observe(acc.model()) == ObserverFlow::Continue {
        while let Some(resolution) = tasks.next().await {
            acc.apply_image(resolution);
            if observer.observe(acc.model()) == ObserverFlow::Stop {
                break;
            }
        }
    }
    Ok(TurnOutcome {
        model: acc.snapshot(),
        end,
        log,
    })
}
