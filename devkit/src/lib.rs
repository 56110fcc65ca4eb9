/*!
# Symbion DevKit - Stubs et Utilitaires pour tester le Healer

Bibliothèque facilitant les tests de la boucle de surveillance avec:
- Backend de métriques en mémoire (sans Prometheus)
- Hôtes simulés reproduisant l'état de node_exporter (sans SSH)
- Horloge manuelle (délais instantanés, hooks d'annulation)
- Harness complet sur répertoire temporaire
*/

pub mod clock;
pub mod host_stub;
pub mod metrics_stub;
pub mod test_utils;

pub use clock::ManualClock;
pub use host_stub::{HostFault, HostSim, SimulatedFleet};
pub use metrics_stub::StubBackend;
pub use test_utils::TestHarness;
