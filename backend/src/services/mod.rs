pub mod access;
pub mod check_in;
pub mod distance;
pub mod family;
pub mod locks;
pub mod mail;
pub mod notifications;
pub mod push;
pub mod stall;

pub use check_in::{CheckInEngine, UpdateOutcome};
pub use distance::{DistanceService, MapboxDirections, RouteProvider};
pub use family::FamilyService;
pub use locks::FamilyLocks;
pub use mail::{PasswordResetMailer, SmtpMailer};
pub use notifications::{CheckInEvent, DispatchReport, NotificationDispatcher};
pub use push::{FcmTransport, LogTransport, PushTransport};
pub use stall::StallPolicy;
