mod classify;
#[cfg(feature = "cli")]
pub mod cli;
pub mod error;
pub mod extract;
pub mod images;
pub mod merge;
pub mod model;
pub mod options;
mod recovery;
pub mod sanitize;
pub mod scanner;
pub mod splitter;
pub mod stream;
#[cfg(feature = "async")]
pub mod turn;

pub use classify::Utf8Decoder;
pub use error::{NovaError, ParseError, ParseErrorKind};
pub use extract::{Extraction, Payload};
pub use images::{ImageData, ImageResolution, SideEffect};
pub use merge::{PagedAccumulator, Upsert};
pub use model::{
    FinalAnswer, FinalAnswerSet, ImageSlot, ImageStatus, QuestionKey, ResponseModel, ResponseShape,
    SolvedPart, SolvedQuestion, TurnState,
};
pub use options::{ExtractionMode, LearningMode, Messages, Options, RuleSpec};
pub use recovery::RecoveryLogEntry;
pub use sanitize::Sanitizer;
pub use splitter::DelimiterSplitter;
pub use stream::TurnParser;

/// Parse a complete response in one call and return the final model.
pub fn parse_to_model(input: &str, opts: &Options) -> Result<ResponseModel, NovaError> {
    parse_chunks_to_model([input], opts)
}

/// Feed a sequence of chunks through a `TurnParser` and return the final model.
/// Image markers become pending slots; no generation is attempted.
pub fn parse_chunks_to_model<I, C>(chunks: I, opts: &Options) -> Result<ResponseModel, NovaError>
where
    I: IntoIterator<Item = C>,
    C: AsRef<str>,
{
    let mut parser = TurnParser::new(opts.clone())?;
    for chunk in chunks {
        parser.push(chunk.as_ref())?;
    }
    parser.finish();
    Ok(parser.into_model())
}

/// Like `parse_chunks_to_model`, also returning the recovery log.
pub fn parse_chunks_with_log<I, C>(
    chunks: I,
    opts: &Options,
) -> Result<(ResponseModel, Vec<RecoveryLogEntry>), NovaError>
where
    I: IntoIterator<Item = C>,
    C: AsRef<str>,
{
    let mut parser = TurnParser::new(opts.clone())?;
    for chunk in chunks {
        parser.push(chunk.as_ref())?;
    }
    parser.finish();
    let log = parser.log().to_vec();
    Ok((parser.into_model(), log))
}

#[cfg(test)]
mod tests;
