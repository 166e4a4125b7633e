use std::str::FromStr;

/// The credential from an `Authorization: Bearer <token>` header.
pub struct Bearer(String);

impl FromStr for Bearer {
    type Err = &'static str;

    fn from_str(header: &str) -> Result<Self, Self::Err> {
        let (scheme, token) = header
            .trim()
            .split_once(' ')
            .ok_or("no space in auth header")?;

        if !scheme.eq_ignore_ascii_case("Bearer") {
            return Err("only bearer auth supported");
        }

        let token = token.trim();
        if token.is_empty() {
            return Err("empty bearer token");
        }

        Ok(Self(token.into()))
    }
}

impl Bearer {
    pub fn token(&self) -> &str {
        &self.0
    }
}
