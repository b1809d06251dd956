//! Vocabulary: bidirectional token/text mapping and prompt encoding.
//!
//! The vocabulary is derived from the model artifact by the backend at load
//! time and owned by the [`Model`](crate::Model) for the model's lifetime.
//! Encoding applies greedy BPE over the merge table, after parsing special
//! token pieces out of the text — chat templates embed them literally.

use std::collections::HashMap;

use crate::error::{ConfabError, Result};
use crate::TokenId;

/// Token/text mapping plus the control tokens the generation loop needs.
#[derive(Debug, Clone)]
pub struct Vocab {
    /// Token id -> UTF-8 text fragment.
    pieces: Vec<String>,

    /// Reverse map: fragment -> token id.
    piece_to_id: HashMap<String, TokenId>,

    /// BPE merge rules, highest priority first.
    merges: Vec<(String, String)>,

    /// Beginning-of-sequence token.
    bos: TokenId,

    /// End-of-generation tokens (end-of-text, end-of-turn, ...).
    eog: Vec<TokenId>,

    /// Ids whose pieces are matched as literal special tokens while encoding.
    specials: Vec<TokenId>,
}

impl Vocab {
    /// Build a vocabulary from backend-derived tables.
    ///
    /// # Panics
    /// If `bos`, any `eog`, or any `specials` id is out of range for
    /// `pieces` — that is a backend bug, not a runtime condition.
    pub fn new(
        pieces: Vec<String>,
        merges: Vec<(String, String)>,
        bos: TokenId,
        eog: Vec<TokenId>,
        specials: Vec<TokenId>,
    ) -> Self {
        let in_range = |id: TokenId| (id as usize) < pieces.len() && id >= 0;
        assert!(in_range(bos), "bos id {bos} out of range");
        assert!(
            eog.iter().chain(&specials).all(|&id| in_range(id)),
            "eog/special id out of range"
        );

        let piece_to_id = pieces
            .iter()
            .enumerate()
            .map(|(id, piece)| (piece.clone(), id as TokenId))
            .collect();

        Vocab {
            pieces,
            piece_to_id,
            merges,
            bos,
            eog,
            specials,
        }
    }

    /// Encode text into token ids.
    ///
    /// Special token pieces are matched literally (earliest occurrence,
    /// longest piece on ties); the text between them is byte-pair encoded.
    /// `add_bos` prepends the beginning-of-sequence token — callers pass
    /// true only for the first prompt against an empty decode context.
    pub fn encode(&self, text: &str, add_bos: bool) -> Result<Vec<TokenId>> {
        let mut tokens = Vec::new();
        if add_bos {
            tokens.push(self.bos);
        }

        let mut rest = text;
        while !rest.is_empty() {
            match self.next_special(rest) {
                Some((start, len, id)) => {
                    self.encode_plain(&rest[..start], &mut tokens)?;
                    tokens.push(id);
                    rest = &rest[start + len..];
                }
                None => {
                    self.encode_plain(rest, &mut tokens)?;
                    break;
                }
            }
        }

        Ok(tokens)
    }

    /// Find the earliest special-token occurrence in `text`.
    /// Returns (byte offset, piece length, token id).
    fn next_special(&self, text: &str) -> Option<(usize, usize, TokenId)> {
        let mut found: Option<(usize, usize, TokenId)> = None;
        for &id in &self.specials {
            let piece = &self.pieces[id as usize];
            if piece.is_empty() {
                continue;
            }
            if let Some(start) = text.find(piece.as_str()) {
                let better = match found {
                    None => true,
                    Some((s, l, _)) => start < s || (start == s && piece.len() > l),
                };
                if better {
                    found = Some((start, piece.len(), id));
                }
            }
        }
        found
    }

    /// Greedy BPE over one plain-text segment.
    fn encode_plain(&self, text: &str, out: &mut Vec<TokenId>) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }

        let mut parts: Vec<String> = text.chars().map(|c| c.to_string()).collect();

        for (a, b) in &self.merges {
            let merged = format!("{a}{b}");
            let mut i = 0;
            while i + 1 < parts.len() {
                if parts[i] == *a && parts[i + 1] == *b {
                    parts[i] = merged.clone();
                    parts.remove(i + 1);
                } else {
                    i += 1;
                }
            }
        }

        for part in &parts {
            match self.piece_to_id.get(part.as_str()) {
                Some(&id) => out.push(id),
                None => {
                    return Err(ConfabError::Input(format!(
                        "text fragment {part:?} has no token"
                    )))
                }
            }
        }
        Ok(())
    }

    /// The UTF-8 fragment for one token. Special tokens render textually;
    /// no leading-space suppression is applied.
    pub fn piece(&self, token: TokenId) -> Result<&str> {
        if token < 0 {
            return Err(ConfabError::PieceConversion { token });
        }
        self.pieces
            .get(token as usize)
            .map(|s| s.as_str())
            .ok_or(ConfabError::PieceConversion { token })
    }

    /// Whether `token` signals end of generation.
    pub fn is_eog(&self, token: TokenId) -> bool {
        self.eog.contains(&token)
    }

    /// The beginning-of-sequence token id.
    pub fn bos(&self) -> TokenId {
        self.bos
    }

    /// Look up a fragment's token id, if it has one.
    pub fn id(&self, piece: &str) -> Option<TokenId> {
        self.piece_to_id.get(piece).copied()
    }

    /// Vocabulary size.
    pub fn n_tokens(&self) -> usize {
        self.pieces.len()
    }
}
