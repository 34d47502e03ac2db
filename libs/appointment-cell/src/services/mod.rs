pub mod booking;
pub mod clock;
pub mod conflict;
pub mod lifecycle;
pub mod store;
pub mod supabase_store;
pub mod validation;

pub use booking::AppointmentBookingService;
pub use clock::{ClinicClock, FixedClinicClock, SystemClinicClock};
pub use lifecycle::AppointmentLifecycleService;
pub use store::{AppointmentStore, InMemoryAppointmentStore, StoreError};
pub use supabase_store::SupabaseAppointmentStore;
pub use validation::{AppointmentValidator, BusinessHours, SchedulingRules};
