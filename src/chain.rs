//! Leaf-to-root certificate chain resolution.
//!
//! Resolution is a small state machine driven by a [`TrustStore`]:
//!
//! ```text
//! Start -> HaveCurrent -> SelfSigned
//!               |
//!               v
//!          LookupIssuer -> Exhausted(NoIssuer)
//!               |
//!               v
//!            Extend -> Exhausted(Cycle)
//!               |
//!               +-----> HaveCurrent
//! ```
//!
//! Every pass through `Extend` either grows the chain by one certificate that is
//! not yet in it or stops, so a run ends after at most as many extensions as
//! there are distinct certificates reachable through the store.

use std::fmt;

use tracing::{debug, info, warn};

use crate::cert::Certificate;
use crate::error::{ChainsmithError, Result};
use crate::pem_utils;
use crate::trust_store::TrustStore;
use crate::verify;

/// Why a resolution stopped short of a self-signed root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExhaustReason {
    /// No candidate from the store verified the current certificate, or the store
    /// could not be queried.
    NoIssuer,
    /// The verified issuer was already in the chain.
    Cycle,
}

/// Terminal state of a resolution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// The last certificate names itself as issuer.
    SelfSigned,
    /// The walk stopped before reaching a self-signed certificate.
    Exhausted(ExhaustReason),
}

impl fmt::Display for ResolutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionState::SelfSigned => f.write_str("self-signed"),
            ResolutionState::Exhausted(ExhaustReason::NoIssuer) => {
                f.write_str("exhausted (no issuer)")
            }
            ResolutionState::Exhausted(ExhaustReason::Cycle) => f.write_str("exhausted (cycle)"),
        }
    }
}

enum State {
    Start,
    HaveCurrent,
    LookupIssuer,
    Extend(Certificate),
    Done(ResolutionState),
}

/// A chain in leaf-first order together with how its resolution ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedChain {
    pub certificates: Vec<Certificate>,
    pub state: ResolutionState,
}

impl ResolvedChain {
    /// True when the chain ends in a self-signed certificate.
    pub fn is_complete(&self) -> bool {
        self.state == ResolutionState::SelfSigned
    }

    pub fn len(&self) -> usize {
        self.certificates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty()
    }

    pub fn leaf(&self) -> Option<&Certificate> {
        self.certificates.first()
    }

    /// The certificate farthest from the leaf.
    pub fn last(&self) -> Option<&Certificate> {
        self.certificates.last()
    }

    /// Concatenated PEM blocks, leaf first.
    pub fn to_pem(&self) -> Result<String> {
        pem_utils::encode_all(&self.certificates)
    }
}

/// Walks issuer relationships through a trust store.
///
/// The resolver holds no state between runs; one instance can serve any number
/// of resolutions, from any thread the store allows.
#[derive(Debug, Clone)]
pub struct ChainResolver<S> {
    store: S,
}

impl<S: TrustStore> ChainResolver<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Decodes `leaf_input` as a PEM bundle and resolves the chain above it.
    ///
    /// Every decoded certificate starts the chain, so an input that already
    /// carries intermediates is extended from its last certificate.
    ///
    /// # Errors
    /// `NoCertificateFound` when the input holds no decodable certificate.
    pub fn resolve(&self, leaf_input: &[u8]) -> Result<ResolvedChain> {
        self.resolve_certificates(pem_utils::decode_all(leaf_input))
    }

    /// Resolves the chain above an already decoded, leaf-first sequence.
    pub fn resolve_certificates(&self, initial: Vec<Certificate>) -> Result<ResolvedChain> {
        let mut chain = initial;
        let mut state = State::Start;

        let terminal = loop {
            state = match state {
                State::Start => {
                    if chain.is_empty() {
                        return Err(ChainsmithError::NoCertificateFound);
                    }
                    debug!(initial = chain.len(), "chain resolution started");
                    State::HaveCurrent
                }
                State::HaveCurrent => {
                    let current = chain.last().ok_or(ChainsmithError::NoCertificateFound)?;
                    if current.is_self_issued() {
                        if !current.is_self_signed() {
                            warn!(
                                subject = %current.subject(),
                                "self-issued certificate does not verify under its own key"
                            );
                        }
                        State::Done(ResolutionState::SelfSigned)
                    } else {
                        State::LookupIssuer
                    }
                }
                State::LookupIssuer => {
                    let current = chain.last().ok_or(ChainsmithError::NoCertificateFound)?;
                    match self.find_issuer(current) {
                        Some(issuer) => State::Extend(issuer),
                        None => State::Done(ResolutionState::Exhausted(ExhaustReason::NoIssuer)),
                    }
                }
                State::Extend(issuer) => {
                    if chain.contains(&issuer) {
                        warn!(
                            subject = %issuer.subject(),
                            "issuer already in chain, stopping"
                        );
                        State::Done(ResolutionState::Exhausted(ExhaustReason::Cycle))
                    } else {
                        debug!(subject = %issuer.subject(), "extending chain");
                        chain.push(issuer);
                        State::HaveCurrent
                    }
                }
                State::Done(terminal) => break terminal,
            };
        };

        info!(length = chain.len(), state = %terminal, "chain resolution finished");
        Ok(ResolvedChain {
            certificates: chain,
            state: terminal,
        })
    }

    /// First store candidate named as `current`'s issuer whose key verifies it.
    fn find_issuer(&self, current: &Certificate) -> Option<Certificate> {
        let candidates = match self.store.find_by_subject(current.issuer()) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!(error = %e, "trust store lookup failed, treating as no match");
                return None;
            }
        };

        debug!(
            issuer = %current.issuer(),
            candidates = candidates.len(),
            "looking up issuer"
        );

        candidates.into_iter().find(|candidate| {
            let ok = verify::verifies(current, candidate);
            if !ok {
                debug!(subject = %candidate.subject(), "candidate does not verify");
            }
            ok
        })
    }
}

/// Resolves the chain for a PEM leaf input against `store`.
pub fn resolve_chain<S: TrustStore>(leaf_input: &[u8], store: S) -> Result<ResolvedChain> {
    ChainResolver::new(store).resolve(leaf_input)
}
