pub mod evaluation_service;
pub mod notification_service;
pub mod profile_service;
pub mod referral_service;
pub mod roster_service;
pub mod school_service;
