use crate::models::Identifier;

/// Store keys for the three facts of one (channel, identifier) challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeKeys {
    pub secret: String,
    pub attempts: String,
    pub cooldown: String,
}

impl ChallengeKeys {
    #[must_use]
    pub fn for_identifier(identifier: &Identifier) -> Self {
        let channel = identifier.channel();
        let value = identifier.value();
        Self {
            secret: format!("otp:{channel}:{value}"),
            attempts: format!("otp:attempts:{channel}:{value}"),
            cooldown: format!("otp:cooldown:{channel}:{value}"),
        }
    }

    /// All three keys, in purge order
    #[must_use]
    pub fn all(&self) -> [&str; 3] {
        [&self.secret, &self.attempts, &self.cooldown]
    }
}
