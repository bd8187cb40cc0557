//! Terminal page states recognised from rendered body text.

/// Page states that end a fetch without extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminalState {
	VerificationChallenge,
	Deleted,
	UnderReview,
	Violation,
	SendFailed,
}

impl TerminalState {
	pub fn as_str(self) -> &'static str {
		match self {
			TerminalState::VerificationChallenge => "verification_challenge",
			TerminalState::Deleted => "deleted",
			TerminalState::UnderReview => "under_review",
			TerminalState::Violation => "violation",
			TerminalState::SendFailed => "send_failed",
		}
	}
}

/// Checked in order; the first matching phrase decides.
const PHRASES: &[(TerminalState, &[&str])] = &[
	(TerminalState::VerificationChallenge, &["当前环境异常，完成验证后即可继续访问"]),
	(TerminalState::Deleted, &["该内容已被发布者删除", "The content has been deleted by the author."]),
	(TerminalState::UnderReview, &["内容审核中", "该内容暂时无法查看"]),
	(
		TerminalState::Violation,
		&["违规无法查看", "Unable to view this content because it violates regulation"],
	),
	(TerminalState::SendFailed, &["发送失败无法查看"]),
];

/// Classifies a page by its `document.body.innerText`.
pub fn classify(body_text: &str) -> Option<TerminalState> {
	PHRASES
		.iter()
		.find(|(_, phrases)| phrases.iter().any(|p| body_text.contains(p)))
		.map(|(state, _)| *state)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn challenge_beats_deleted() {
		let body = "该内容已被发布者删除\n当前环境异常，完成验证后即可继续访问";
		assert_eq!(classify(body), Some(TerminalState::VerificationChallenge));
	}

	#[test]
	fn english_variants_are_recognised() {
		assert_eq!(classify("The content has been deleted by the author."), Some(TerminalState::Deleted));
		assert_eq!(
			classify("Unable to view this content because it violates regulation"),
			Some(TerminalState::Violation)
		);
	}

	#[test]
	fn temporarily_unavailable_counts_as_review() {
		assert_eq!(classify("该内容暂时无法查看"), Some(TerminalState::UnderReview));
		assert_eq!(classify("内容审核中 违规无法查看"), Some(TerminalState::UnderReview));
	}

	#[test]
	fn ordinary_article_is_not_terminal() {
		assert_eq!(classify("今天我们聊聊 Rust 的所有权"), None);
		assert_eq!(classify("发送失败无法查看"), Some(TerminalState::SendFailed));
	}
}
