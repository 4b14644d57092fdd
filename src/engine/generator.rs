use futures::Stream;

use crate::engine::Engine;
use crate::engine::request::{GeneratorParams, Request};
use crate::error::Result;
use crate::runtime::Model;
use crate::tokenizer::TokenizerStream;

/// Single-request generation context for the interactive loop. Owns its own
/// engine so that dropping the generator releases every runtime resource
/// tied to the round; the next generator must only be created after this
/// one is gone.
pub struct Generator {
    engine: Engine,
    request: Request,
    stream: TokenizerStream,
}

impl Generator {
    pub fn new(model: &Model, input_ids: Vec<u32>, params: GeneratorParams) -> Result<Self> {
        let mut engine = Engine::new(model.runtime());
        let request = Request::new(input_ids, params);
        engine.add_request(&request)?;
        let stream = TokenizerStream::new(model.tokenizer());
        Ok(Self { engine, request, stream })
    }

    pub fn is_done(&self) -> bool {
        self.request.is_done()
    }

    /// Advances the underlying engine by one decode step.
    pub async fn generate_next_token(&mut self) -> Result<()> {
        self.engine.step().await
    }

    /// Decodes whatever the last step produced. Empty while the tokenizer
    /// stream is holding back an incomplete UTF-8 sequence.
    pub fn next_piece(&mut self) -> Result<String> {
        let mut piece = String::new();
        while let Some(token) = self.request.next_unseen_token() {
            piece.push_str(&self.stream.decode(token)?);
        }
        Ok(piece)
    }

    pub fn generated_token_count(&self) -> usize {
        self.request.generated_token_count()
    }

    /// Streams decoded text pieces, one item per engine step, until the
    /// request completes. Consumes the generator; it is released when the
    /// stream is dropped.
    pub fn into_stream(self) -> impl Stream<Item = Result<String>> {
        futures::stream::try_unfold(self, |mut generator| async move {
            if generator.is_done() {
                return Ok(None);
            }
            generator.generate_next_token().await?;
            let piece = generator.next_piece()?;
            Ok(Some((piece, generator)))
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;
    use crate::runtime::model_for_tests;
    use crate::tokenizer::Tokenizer as _;

    #[tokio::test]
    async fn streams_one_piece_per_token() {
        let model = model_for_tests();
        let input_ids = model.tokenizer().encode("abc").unwrap();
        let generator =
            Generator::new(&model, input_ids, GeneratorParams::default()).unwrap();

        let mut stream = std::pin::pin!(generator.into_stream());
        let mut pieces = Vec::new();
        while let Some(piece) = stream.next().await {
            pieces.push(piece.unwrap());
        }
        // three echoed bytes plus the empty EOS piece
        assert_eq!(pieces.len(), 4);
        assert_eq!(pieces.concat(), "abc");
    }

    #[tokio::test]
    async fn stepwise_drive_matches_stream() {
        let model = model_for_tests();
        let input_ids = model.tokenizer().encode("hi").unwrap();
        let mut generator =
            Generator::new(&model, input_ids, GeneratorParams::default()).unwrap();

        let mut text = String::new();
        while !generator.is_done() {
            generator.generate_next_token().await.unwrap();
            text.push_str(&generator.next_piece().unwrap());
        }
        assert_eq!(text, "hi");
        assert_eq!(generator.generated_token_count(), 3);
    }
}
