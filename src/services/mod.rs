// Storefront core
pub mod carts;
pub mod checkout;
pub mod discounts;
pub mod orders;
pub mod pricing;

// Collaborators the pricing and checkout flows depend on
pub mod inventory;
pub mod payments;
pub mod tax;

// Catalog and accounts
pub mod catalog;
pub mod customers;
