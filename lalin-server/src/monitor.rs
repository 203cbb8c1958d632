/**
 * MONITOR STATE - "Qu'est-ce qu'on surveille en ce moment ?"
 *
 * RÔLE : Cible unique active (ou idle). Écrite par le CommandProcessor
 * (SEARCH / RESET), lue une fois par cycle par la BroadcastLoop.
 *
 * ARCHITECTURE : Option<MonitorTarget> sous mutex. Le remplacement se fait en
 * une seule affectation, un lecteur voit l'ancienne cible ou la nouvelle,
 * jamais un mélange. `snapshot()` rend une copie : le verrou est relâché avant
 * tout appel réseau.
 */

use crate::models::MonitorTarget;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Clone, Default)]
pub struct MonitorState {
    target: Arc<Mutex<Option<MonitorTarget>>>,
}

impl MonitorState {
    /// État idle.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_target(target: Option<MonitorTarget>) -> Self {
        Self {
            target: Arc::new(Mutex::new(target)),
        }
    }

    /// Remplace la cible active, retourne la précédente.
    pub fn set(&self, target: MonitorTarget) -> Option<MonitorTarget> {
        self.target.lock().replace(target)
    }

    /// Passe en idle, retourne la cible qui était active.
    pub fn clear(&self) -> Option<MonitorTarget> {
        self.target.lock().take()
    }

    pub fn snapshot(&self) -> Option<MonitorTarget> {
        self.target.lock().clone()
    }

    pub fn is_idle(&self) -> bool {
        self.target.lock().is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Coordinates;

    fn target(name: &str, lat: f64, lon: f64) -> MonitorTarget {
        MonitorTarget::new(name, Coordinates::new(lat, lon))
    }

    #[test]
    fn test_starts_idle() {
        let state = MonitorState::new();
        assert!(state.is_idle());
        assert_eq!(state.snapshot(), None);
    }

    #[test]
    fn test_set_and_clear() {
        let state = MonitorState::new();
        assert_eq!(state.set(target("A", 1.0, 2.0)), None);

        let previous = state.set(target("B", 3.0, 4.0));
        assert_eq!(previous.map(|t| t.name), Some("A".to_string()));
        assert_eq!(state.snapshot(), Some(target("B", 3.0, 4.0)));

        assert_eq!(state.clear(), Some(target("B", 3.0, 4.0)));
        assert_eq!(state.clear(), None);
        assert!(state.is_idle());
    }

    #[test]
    fn test_readers_never_see_mixed_targets() {
        let state = MonitorState::new();
        let a = target("Jalan A", -1.0, 101.0);
        let b = target("Jalan B", -2.0, 102.0);

        let writer = {
            let state = state.clone();
            let (a, b) = (a.clone(), b.clone());
            std::thread::spawn(move || {
                for i in 0..2000 {
                    if i % 2 == 0 {
                        state.set(a.clone());
                    } else {
                        state.set(b.clone());
                    }
                }
            })
        };

        let reader = {
            let state = state.clone();
            std::thread::spawn(move || {
                for _ in 0..2000 {
                    if let Some(seen) = state.snapshot() {
                        assert!(seen == a || seen == b, "mixed target observed: {:?}", seen);
                    }
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
    }
}
