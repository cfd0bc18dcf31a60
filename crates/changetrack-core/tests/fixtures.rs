#![allow(dead_code)]

use changetrack_core::{List, Object, Shape};
use std::rc::Rc;

pub struct Shapes {
    pub order: Rc<Shape>,
    pub address: Rc<Shape>,
    pub order_detail: Rc<Shape>,
    pub inventory_update: Rc<Shape>,
    pub link: Rc<Shape>,
}

pub fn shapes() -> Shapes {
    let order = Shape::builder("Order")
        .int("Id")
        .text("CustomerNumber")
        .complex("Address", "Address")
        .collection("OrderDetails", "OrderDetail")
        .build()
        .expect("order shape");
    let address = Shape::builder("Address")
        .int("AddressId")
        .text("City")
        .build()
        .expect("address shape");
    let order_detail = Shape::builder("OrderDetail")
        .int("OrderDetailId")
        .text("ItemNo")
        .build()
        .expect("order detail shape");
    let inventory_update = Shape::builder("InventoryUpdate")
        .int("InventoryUpdateId")
        .complex("LinkedInventoryUpdate", "InventoryUpdate")
        .complex("LinkedToInventoryUpdate", "InventoryUpdate")
        .build()
        .expect("inventory update shape");
    let link = Shape::builder("Link")
        .int("Id")
        .complex("Next", "Link")
        .build()
        .expect("link shape");

    Shapes {
        order,
        address,
        order_detail,
        inventory_update,
        link,
    }
}

pub fn address(city: &str) -> Object {
    let shapes = shapes();
    Object::new(&shapes.address)
        .with("AddressId", 1)
        .and_then(|a| a.with("City", city))
        .expect("address")
}

pub fn order_detail(id: i64, item_no: &str) -> Object {
    let shapes = shapes();
    Object::new(&shapes.order_detail)
        .with("OrderDetailId", id)
        .and_then(|d| d.with("ItemNo", item_no))
        .expect("order detail")
}

/// An order with an address in Chicago and two order details.
pub fn order() -> Object {
    let shapes = shapes();
    let details = List::from_values(vec![
        order_detail(1, "12345").into(),
        order_detail(2, "54321").into(),
    ]);
    Object::new(&shapes.order)
        .with("Id", 1)
        .and_then(|o| o.with("CustomerNumber", "Customer1"))
        .and_then(|o| o.with("Address", address("Chicago")))
        .and_then(|o| o.with("OrderDetails", details))
        .expect("order")
}

/// Two inventory updates linked to each other in both directions.
pub fn linked_inventory_updates() -> (Object, Object) {
    let shapes = shapes();
    let first = Object::new(&shapes.inventory_update)
        .with("InventoryUpdateId", 1)
        .expect("first");
    let second = Object::new(&shapes.inventory_update)
        .with("InventoryUpdateId", 2)
        .expect("second");

    first.set("LinkedInventoryUpdate", &second).expect("link");
    second.set("LinkedToInventoryUpdate", &first).expect("link back");
    (first, second)
}

/// `len` links, each pointing at the next; the last points back at the first.
pub fn ring(len: usize) -> Vec<Object> {
    let shapes = shapes();
    let links: Vec<Object> = (0..len).map(|_| Object::new(&shapes.link)).collect();
    for (i, link) in links.iter().enumerate() {
        link.set("Next", &links[(i + 1) % len]).expect("link");
    }
    links
}

/// `len` links in a line. Returns the head and the tail.
pub fn chain(len: usize) -> (Object, Object) {
    let shapes = shapes();
    let head = Object::new(&shapes.link);
    let mut tail = head.clone();
    for _ in 1..len {
        let next = Object::new(&shapes.link);
        tail.set("Next", &next).expect("link");
        tail = next;
    }
    (head, tail)
}
