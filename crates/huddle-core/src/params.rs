use crate::errors::CallError;

/// Credentials the user types in before joining a channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionParameters {
    pub application_id: String,
    pub channel_name: String,
    pub access_token: Option<String>,
}

/// Partial update of [`ConnectionParameters`]. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct ParameterUpdate {
    pub application_id: Option<String>,
    pub channel_name: Option<String>,
    /// `Some(String::new())` clears the token.
    pub access_token: Option<String>,
}

impl ParameterUpdate {
    pub fn application_id(mut self, value: impl Into<String>) -> Self {
        self.application_id = Some(value.into());
        self
    }

    pub fn channel_name(mut self, value: impl Into<String>) -> Self {
        self.channel_name = Some(value.into());
        self
    }

    pub fn access_token(mut self, value: impl Into<String>) -> Self {
        self.access_token = Some(value.into());
        self
    }
}

/// Validated snapshot handed to the provider on join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub application_id: String,
    pub channel_name: String,
    /// Never `Some("")`: providers treat "no token" and "empty token" differently.
    pub token: Option<String>,
}

fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

impl ConnectionParameters {
    pub fn apply(&mut self, update: ParameterUpdate) {
        if let Some(app_id) = update.application_id {
            self.application_id = app_id;
        }
        if let Some(channel) = update.channel_name {
            self.channel_name = channel;
        }
        if let Some(token) = update.access_token {
            self.access_token = Some(token);
        }
    }

    /// True when both required fields are filled in.
    pub fn is_complete(&self) -> bool {
        self.validate().is_ok()
    }

    pub fn validate(&self) -> Result<(), CallError> {
        if is_blank(&self.application_id) {
            return Err(CallError::MissingParameter("application id"));
        }
        if is_blank(&self.channel_name) {
            return Err(CallError::MissingParameter("channel name"));
        }
        Ok(())
    }

    /// The token as the provider should see it: blank means absent.
    pub fn join_token(&self) -> Option<&str> {
        self.access_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    pub fn to_join_request(&self) -> Result<JoinRequest, CallError> {
        self.validate()?;
        Ok(JoinRequest {
            application_id: self.application_id.trim().to_string(),
            channel_name: self.channel_name.trim().to_string(),
            token: self.join_token().map(str::to_string),
        })
    }
}
