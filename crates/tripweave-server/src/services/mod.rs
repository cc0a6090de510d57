pub mod access;
pub mod activity;
pub mod budget;
pub mod collaboration;
pub mod geocode;
pub mod itinerary;
pub mod notify;
pub mod presence;
pub mod trips;
pub mod users;
pub mod validate;

#[cfg(test)]
pub mod testing;
