use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Fixed-capacity gate in front of function execution.
///
/// Admission never waits: a caller arriving when every slot is taken is
/// rejected immediately.
#[derive(Debug, Clone)]
pub struct Admission {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One granted execution slot. Dropping it releases the slot.
#[derive(Debug)]
pub struct AdmissionSlot {
    _permit: OwnedSemaphorePermit,
}

impl Admission {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub fn try_acquire(&self) -> Option<AdmissionSlot> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| AdmissionSlot { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.capacity
            .saturating_sub(self.semaphore.available_permits())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_when_full() {
        let admission = Admission::new(2);
        let a = admission.try_acquire();
        let b = admission.try_acquire();
        assert!(a.is_some() && b.is_some());
        assert!(admission.try_acquire().is_none());
        assert_eq!(admission.in_flight(), 2);

        drop(a);
        assert_eq!(admission.in_flight(), 1);
        assert!(admission.try_acquire().is_some());
    }

    #[test]
    fn test_release_on_every_path() {
        let admission = Admission::new(1);

        let outcome: Result<(), &str> = (|| {
            let _slot = admission.try_acquire().ok_or("denied")?;
            Err("function failed")
        })();
        assert!(outcome.is_err());
        assert_eq!(admission.in_flight(), 0);

        let handle = {
            let admission = admission.clone();
            std::thread::spawn(move || {
                let _slot = admission.try_acquire().unwrap();
                panic!("function panicked");
            })
        };
        assert!(handle.join().is_err());
        assert_eq!(admission.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_bound_holds_under_contention() {
        let admission = Admission::new(3);
        let mut tasks = Vec::new();
        for _ in 0..32 {
            let admission = admission.clone();
            tasks.push(tokio::spawn(async move {
                let slot = admission.try_acquire();
                assert!(admission.in_flight() <= admission.capacity());
                if slot.is_some() {
                    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
                }
                slot.is_some()
            }));
        }
        let mut granted = 0;
        for t in tasks {
            if t.await.unwrap() {
                granted += 1;
            }
        }
        assert!(granted >= 3);
        assert_eq!(admission.in_flight(), 0);
    }
}
