/*!
# Lalin DevKit - Mocks et utilitaires de test

Bibliothèque pour tester le serveur sans réseau ni API TomTom :
- MockTransport : socket simulé (envois enregistrés, échecs programmables)
- MockProvider : géocodage et relevés scriptés, latence simulée
- MockBulletin : bulletin météo scripté pour le mode `weather`
- TestHarness : serveur réel sur 127.0.0.1:0 + abonnés UDP de test
*/

pub mod mock_bulletin;
pub mod mock_provider;
pub mod mock_transport;
pub mod test_utils;

pub use mock_bulletin::MockBulletin;
pub use mock_provider::{sample_reading, MockProvider};
pub use mock_transport::MockTransport;
pub use test_utils::{TestHarness, TestSubscriber};
