use crate::error::NegotiationError;
use tandem_core::{IceCandidate, SdpType};

/// Resets allowed without a successfully applied remote description in
/// between.
pub const MAX_CONSECUTIVE_RESETS: u32 = 3;

/// Signaling state of a peer transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignalingState {
    #[default]
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

/// What to do with an incoming remote description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteDescriptionAction {
    /// Our own concurrent offer wins; drop theirs.
    Ignore,
    Apply,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetOrigin {
    /// A description failed to apply on this side.
    LocalFailure,
    /// The peer sent a reset marker.
    RemoteRequest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetPlan {
    /// Whether to tell the peer to rebuild too.
    pub send_reset: bool,
}

/// Perfect-negotiation bookkeeping for one session. Every method is a pure
/// transition; the session actor performs the effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NegotiationState {
    polite: bool,
    making_offer: bool,
    ignoring_offer: bool,
    setting_remote_answer_pending: bool,
    suppressing_initial_offer: bool,
    consecutive_resets: u32,
}

impl NegotiationState {
    pub fn new(polite: bool) -> Self {
        Self {
            polite,
            making_offer: false,
            ignoring_offer: false,
            setting_remote_answer_pending: false,
            suppressing_initial_offer: false,
            consecutive_resets: 0,
        }
    }

    pub fn polite(&self) -> bool {
        self.polite
    }

    pub fn is_making_offer(&self) -> bool {
        self.making_offer
    }

    pub fn is_ignoring_offer(&self) -> bool {
        self.ignoring_offer
    }

    pub fn is_setting_remote_answer_pending(&self) -> bool {
        self.setting_remote_answer_pending
    }

    pub fn is_suppressing_initial_offer(&self) -> bool {
        self.suppressing_initial_offer
    }

    pub fn consecutive_resets(&self) -> u32 {
        self.consecutive_resets
    }

    /// Negotiation-needed fired. Returns `false` when the offer must be
    /// skipped because we are waiting for the peer's post-reset offer.
    pub fn begin_offer(&mut self) -> bool {
        if self.suppressing_initial_offer {
            return false;
        }
        self.making_offer = true;
        true
    }

    /// Runs after every offer attempt, successful or not.
    pub fn finish_offer(&mut self) {
        self.making_offer = false;
    }

    pub fn classify_remote_description(
        &mut self,
        sdp_type: SdpType,
        signaling_state: SignalingState,
    ) -> RemoteDescriptionAction {
        let ready_for_offer = !self.making_offer
            && (signaling_state == SignalingState::Stable || self.setting_remote_answer_pending);
        let offer_collision = sdp_type == SdpType::Offer && !ready_for_offer;

        self.ignoring_offer = !self.polite && offer_collision;
        if self.ignoring_offer {
            return RemoteDescriptionAction::Ignore;
        }

        self.setting_remote_answer_pending = sdp_type == SdpType::Answer;
        RemoteDescriptionAction::Apply
    }

    pub fn remote_description_applied(&mut self) {
        self.setting_remote_answer_pending = false;
        self.consecutive_resets = 0;
    }

    /// Our answer to the peer's offer went out.
    pub fn answer_sent(&mut self) {
        self.suppressing_initial_offer = false;
    }

    /// Clears the handshake flags ahead of a transport rebuild.
    ///
    /// Only the polite side announces the reset, and only for a failure of
    /// its own: answering a received reset with another would bounce forever.
    pub fn reset(&mut self, origin: ResetOrigin) -> Result<ResetPlan, NegotiationError> {
        self.consecutive_resets += 1;
        if self.consecutive_resets > MAX_CONSECUTIVE_RESETS {
            return Err(NegotiationError::ResetLimitExceeded(MAX_CONSECUTIVE_RESETS));
        }

        self.making_offer = false;
        self.ignoring_offer = false;
        self.setting_remote_answer_pending = false;
        self.suppressing_initial_offer = self.polite;

        Ok(ResetPlan {
            send_reset: self.polite && origin == ResetOrigin::LocalFailure,
        })
    }

    /// Candidate failures are expected while ignoring an offer and for the
    /// empty end-of-candidates marker.
    pub fn should_report_candidate_error(&self, candidate: &IceCandidate) -> bool {
        !self.ignoring_offer && !candidate.is_end_of_candidates()
    }
}
