use crate::error::AdmissionError;
use crate::vehicle::PendingVehicle;
use log::error;
use std::collections::VecDeque;
use std::fmt;

/// A vehicle's place in an admission queue, issued in arrival order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(pub u64);

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The vehicles waiting to enter one lane, in arrival order.
///
/// Vehicles only leave by release of the head of the queue. Requests to
/// release any other vehicle are programming errors: they panic in debug
/// builds and are refused with an [AdmissionError] otherwise.
#[derive(Debug, Default)]
pub struct AdmissionQueue {
    vehicles: VecDeque<(Ticket, PendingVehicle)>,
    next_ticket: u64,
}

impl AdmissionQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Default::default()
    }

    /// The number of waiting vehicles.
    pub fn len(&self) -> usize {
        self.vehicles.len()
    }

    /// Whether no vehicles are waiting.
    pub fn is_empty(&self) -> bool {
        self.vehicles.is_empty()
    }

    /// Adds a vehicle to the back of the queue.
    pub fn push(&mut self, vehicle: PendingVehicle) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.vehicles.push_back((ticket, vehicle));
        ticket
    }

    /// The vehicle at the head of the queue, without removing it.
    pub fn peek(&self) -> Option<(Ticket, &PendingVehicle)> {
        self.vehicles.front().map(|(ticket, vehicle)| (*ticket, vehicle))
    }

    /// Iterates over the waiting vehicles from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = (Ticket, &PendingVehicle)> {
        self.vehicles.iter().map(|(ticket, vehicle)| (*ticket, vehicle))
    }

    /// Removes the vehicle holding `ticket`, which must be at the head of the queue.
    pub fn release(&mut self, ticket: Ticket) -> Result<PendingVehicle, AdmissionError> {
        let head = match self.vehicles.front() {
            Some((head, _)) => *head,
            None => return Self::violation(AdmissionError::Empty),
        };
        if head != ticket {
            return Self::violation(AdmissionError::NotAtHead {
                requested: ticket,
                head,
            });
        }
        match self.vehicles.pop_front() {
            Some((_, vehicle)) => Ok(vehicle),
            None => Self::violation(AdmissionError::Empty),
        }
    }

    fn violation<T>(err: AdmissionError) -> Result<T, AdmissionError> {
        debug_assert!(false, "admission queue invariant violated: {}", err);
        error!("admission queue invariant violated: {}", err);
        Err(err)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::vehicle::{Driver, DriverId, VehicleAttributes};

    fn pending(id: u64) -> PendingVehicle {
        PendingVehicle::new(
            VehicleAttributes::default(),
            0.0,
            Driver::new(DriverId(id), "car"),
        )
    }

    #[test]
    fn fifo_order() {
        let mut queue = AdmissionQueue::new();
        let tickets = (10..15).map(|id| queue.push(pending(id))).collect::<Vec<_>>();
        assert_eq!(queue.len(), 5);

        let mut released = vec![];
        while let Some((ticket, _)) = queue.peek() {
            released.push(queue.release(ticket).unwrap().driver.id().0);
        }
        assert_eq!(released, vec![10, 11, 12, 13, 14]);
        assert!(tickets.windows(2).all(|w| w[0] < w[1]));
        assert!(queue.is_empty());
    }

    #[test]
    fn peek_does_not_remove() {
        let mut queue = AdmissionQueue::new();
        queue.push(pending(1));
        assert_eq!(queue.peek().map(|(t, _)| t), queue.peek().map(|(t, _)| t));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "invariant violated"))]
    fn release_out_of_order() {
        let mut queue = AdmissionQueue::new();
        let first = queue.push(pending(1));
        let second = queue.push(pending(2));
        assert_eq!(
            queue.release(second).unwrap_err(),
            AdmissionError::NotAtHead {
                requested: second,
                head: first
            }
        );
        assert_eq!(queue.len(), 2);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "invariant violated"))]
    fn double_release() {
        let mut queue = AdmissionQueue::new();
        let first = queue.push(pending(1));
        queue.release(first).unwrap();
        assert_eq!(queue.release(first).unwrap_err(), AdmissionError::Empty);
    }
}
