pub mod cart;
pub mod cart_discount;
pub mod cart_item;
pub mod customer;
pub mod discount_code;
pub mod discount_redemption;
pub mod inventory_level;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod product;
pub mod product_variant;

// Re-export entities
pub use cart::{CartStatus, Entity as Cart, Model as CartModel};
pub use cart_discount::{Entity as CartDiscount, Model as CartDiscountModel};
pub use cart_item::{Entity as CartItem, Model as CartItemModel};
pub use customer::{CustomerStatus, Entity as Customer, Model as CustomerModel};
pub use discount_code::{
    DiscountScope, DiscountType, Entity as DiscountCode, Model as DiscountCodeModel,
};
pub use discount_redemption::{Entity as DiscountRedemption, Model as DiscountRedemptionModel};
pub use inventory_level::{Entity as InventoryLevel, Model as InventoryLevelModel};
pub use order::{Entity as Order, Model as OrderModel, OrderStatus};
pub use order_item::{Entity as OrderItem, Model as OrderItemModel};
pub use payment::{Entity as Payment, Model as PaymentModel, PaymentStatus};
pub use product::{Entity as Product, Model as ProductModel, ProductStatus};
pub use product_variant::{Entity as ProductVariant, Model as ProductVariantModel};
