use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::transport::{SameSitePolicy, SetCookie};

/// Apply engine-emitted cookies to a response jar.
///
/// Zero-max-age entries become browser-side removals.
#[must_use]
pub fn apply_cookies(mut jar: CookieJar, cookies: &[SetCookie]) -> CookieJar {
    for cookie in cookies {
        jar = jar.add(to_cookie(cookie));
    }
    jar
}

fn to_cookie(set: &SetCookie) -> Cookie<'static> {
    Cookie::build((set.name.clone(), set.value.clone()))
        .http_only(set.opts.http_only)
        .secure(set.opts.secure)
        .same_site(match set.opts.same_site {
            SameSitePolicy::Strict => SameSite::Strict,
            SameSitePolicy::Lax => SameSite::Lax,
            SameSitePolicy::None => SameSite::None,
        })
        .path(set.opts.path.clone())
        .max_age(Duration::seconds(set.max_age))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::CookieOpts;

    #[test]
    fn conversion_preserves_attributes() {
        let set = SetCookie {
            name: "_refresh_token_signature".into(),
            value: "sig".into(),
            max_age: 60,
            opts: CookieOpts::default(),
        };
        let cookie = to_cookie(&set);

        assert_eq!(cookie.name(), "_refresh_token_signature");
        assert_eq!(cookie.value(), "sig");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/"));
        assert_eq!(cookie.max_age(), Some(Duration::seconds(60)));
    }

    #[test]
    fn removal_converts_to_zero_max_age() {
        let cookie = to_cookie(&SetCookie::removal("_access_token_signature", CookieOpts::default()));
        assert_eq!(cookie.max_age(), Some(Duration::ZERO));
        assert_eq!(cookie.value(), "");
    }
}
